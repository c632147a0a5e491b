//! Per-item asset transfer through a bounded worker pool.
//!
//! Concurrency is scoped to a single item: the pool fans one item's assets
//! out across at most `workers` slots, waits for all of them, and returns
//! results re-sorted into the item's original asset order. Each slot gets
//! its own destination client from the [`FileStoreFactory`], so no
//! connection state is shared between slots.

mod compress;

pub use compress::compress_if_needed;

use crate::core::{sanitize_filename, RetryPolicy};
use crate::error::{MigrateError, Result};
use crate::source::Asset;
use crate::target::{FileStore, FileStoreFactory};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Downloads an asset's payload from the source.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, asset: &Asset) -> Result<Vec<u8>>;
}

/// Fetcher for the signed public URLs carried on assets. Downloads are
/// read-only, so a single shared client serves all pool slots.
pub struct HttpFetcher {
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            retry,
        }
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, asset: &Asset) -> Result<Vec<u8>> {
        let url = asset.public_url.as_deref().ok_or_else(|| {
            MigrateError::transfer(&asset.name, "asset has no public url")
        })?;
        self.retry
            .run("asset download", || async {
                let bytes = self
                    .http
                    .get(url)
                    .send()
                    .await?
                    .error_for_status()?
                    .bytes()
                    .await?;
                Ok(bytes.to_vec())
            })
            .await
    }
}

/// Terminal state of one asset transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The asset is present at the destination. `bytes_uploaded` is 0 when
    /// an existing file was reused instead of uploaded.
    Success { link: String, bytes_uploaded: u64 },
    Failed { reason: String },
}

/// Outcome of one asset, tagged with its position in the item's asset list.
#[derive(Debug, Clone)]
pub struct TransferResult {
    pub asset_index: usize,
    pub asset_name: String,
    pub outcome: TransferOutcome,
}

impl TransferResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TransferOutcome::Success { .. })
    }

    pub fn link(&self) -> Option<&str> {
        match &self.outcome {
            TransferOutcome::Success { link, .. } => Some(link),
            TransferOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    /// Worker pool width.
    pub workers: usize,
    /// Images above this byte size are recompressed before upload.
    pub compress_threshold: u64,
}

/// Fans one item's assets across the worker pool.
pub struct TransferEngine {
    fetcher: Arc<dyn AssetFetcher>,
    stores: Arc<dyn FileStoreFactory>,
    config: TransferConfig,
}

impl TransferEngine {
    pub fn new(
        fetcher: Arc<dyn AssetFetcher>,
        stores: Arc<dyn FileStoreFactory>,
        config: TransferConfig,
    ) -> Self {
        Self {
            fetcher,
            stores,
            config,
        }
    }

    /// Transfer every asset of one item. Individual failures surface as
    /// [`TransferOutcome::Failed`] entries rather than aborting the batch;
    /// results come back in the item's original asset order.
    pub async fn transfer_item(&self, item_name: &str, assets: Vec<Asset>) -> Vec<TransferResult> {
        if assets.is_empty() {
            return Vec::new();
        }
        let prefix = sanitize_filename(item_name);

        let slot_count = self.config.workers.min(assets.len()).max(1);
        let mut slots: Vec<Vec<(usize, Asset)>> = vec![Vec::new(); slot_count];
        for (index, asset) in assets.into_iter().enumerate() {
            slots[index % slot_count].push((index, asset));
        }

        let mut handles = Vec::with_capacity(slot_count);
        let mut manifests = Vec::with_capacity(slot_count);
        for slot_assets in slots {
            let manifest: Vec<(usize, String)> = slot_assets
                .iter()
                .map(|(index, asset)| (*index, asset.name.clone()))
                .collect();
            let store = self.stores.create();
            let fetcher = Arc::clone(&self.fetcher);
            let prefix = prefix.clone();
            let threshold = self.config.compress_threshold;

            let handle = tokio::spawn(async move {
                let mut results = Vec::with_capacity(slot_assets.len());
                for (index, asset) in slot_assets {
                    results.push(
                        transfer_one(&*fetcher, &*store, &prefix, index, asset, threshold).await,
                    );
                }
                results
            });
            handles.push(handle);
            manifests.push(manifest);
        }

        let mut results = Vec::new();
        let joined = futures::future::join_all(handles).await;
        for (slot_result, manifest) in joined.into_iter().zip(manifests) {
            match slot_result {
                Ok(slot_results) => results.extend(slot_results),
                Err(e) => {
                    warn!("Transfer slot task failed: {}", e);
                    results.extend(manifest.into_iter().map(|(asset_index, asset_name)| {
                        TransferResult {
                            asset_index,
                            asset_name,
                            outcome: TransferOutcome::Failed {
                                reason: format!("worker task failed: {}", e),
                            },
                        }
                    }));
                }
            }
        }

        results.sort_by_key(|r| r.asset_index);
        results
    }
}

async fn transfer_one(
    fetcher: &dyn AssetFetcher,
    store: &dyn FileStore,
    prefix: &str,
    asset_index: usize,
    asset: Asset,
    compress_threshold: u64,
) -> TransferResult {
    let filename = sanitize_filename(&format!("{}_{}", prefix, asset.name));
    let outcome = run_transfer(fetcher, store, &filename, &asset, compress_threshold).await;
    if let TransferOutcome::Failed { reason } = &outcome {
        warn!(asset = %asset.name, "Asset transfer failed: {}", reason);
    }
    TransferResult {
        asset_index,
        asset_name: asset.name,
        outcome,
    }
}

async fn run_transfer(
    fetcher: &dyn AssetFetcher,
    store: &dyn FileStore,
    filename: &str,
    asset: &Asset,
    compress_threshold: u64,
) -> TransferOutcome {
    // Destination-side dedup: an identically named file in the folder is
    // reused, keeping re-runs upload-free.
    match store.find_existing(filename).await {
        Ok(Some(link)) => {
            debug!(filename, "Reusing existing destination file");
            return TransferOutcome::Success {
                link,
                bytes_uploaded: 0,
            };
        }
        Ok(None) => {}
        Err(e) => {
            return TransferOutcome::Failed {
                reason: format!("existence check: {}", e),
            }
        }
    }

    let bytes = match fetcher.fetch(asset).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return TransferOutcome::Failed {
                reason: format!("download: {}", e),
            }
        }
    };

    let bytes = compress_if_needed(bytes, compress_threshold);
    let size = bytes.len() as u64;

    match store.upload(filename, bytes).await {
        Ok(link) => TransferOutcome::Success {
            link,
            bytes_uploaded: size,
        },
        Err(e) => TransferOutcome::Failed {
            reason: format!("upload: {}", e),
        },
    }
}
