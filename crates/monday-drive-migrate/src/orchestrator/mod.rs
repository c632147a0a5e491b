//! Migration orchestrator.
//!
//! Drives the whole pipeline: build the duplicate registry from the row
//! log, stream items from the saved offset, fan each item's assets through
//! the transfer pool, append the item's row, and advance the progress
//! cursor over the contiguous committed prefix.
//!
//! Commit order per item is fixed: every asset first, then the row, then
//! the cursor. A crash between steps leaves either nothing recorded (the
//! next run redoes the item, reusing already-uploaded files by name) or
//! the row recorded (the next run's registry skips the item). The cursor
//! stops advancing at the first failed item so a later restart cannot jump
//! over it; items completed past that point are absorbed by the registry
//! instead.

use crate::config::{Config, TargetMode};
use crate::core::RetryPolicy;
use crate::error::Result;
use crate::notify::{Notifier, SlackNotifier};
use crate::registry::DuplicateRegistry;
use crate::source::{Asset, BoardSource, Item, ItemStream, MondayClient};
use crate::state::ProgressCursor;
use crate::target::{DestinationRow, DriveClientFactory, RowSheet, SheetsClient};
use crate::transfer::{HttpFetcher, TransferConfig, TransferEngine, TransferOutcome};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Summary of one migration run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationResult {
    /// Run start, RFC 3339 UTC.
    pub started_at: String,
    pub duration_seconds: f64,
    /// Items read from the source, including skipped ones.
    pub items_seen: usize,
    pub items_migrated: usize,
    pub items_skipped: usize,
    pub items_failed: usize,
    /// Names of items that did not commit this run.
    pub failed_items: Vec<String>,
    /// Assets uploaded or reused across all migrated items.
    pub assets_transferred: usize,
    pub bytes_uploaded: u64,
    /// Progress cursor value at the end of the run.
    pub final_offset: usize,
    /// Whether the run stopped early on a cancellation request.
    pub cancelled: bool,
}

impl MigrationResult {
    pub fn is_clean(&self) -> bool {
        self.items_failed == 0 && !self.cancelled
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub struct Orchestrator {
    source: Arc<dyn BoardSource>,
    sheet: Arc<dyn RowSheet>,
    engine: TransferEngine,
    notifier: Option<Arc<dyn Notifier>>,
    cursor: ProgressCursor,
    mode: TargetMode,
    /// Source page limit, needed by the stream's fast-forward pruning.
    page_size: usize,
}

impl Orchestrator {
    /// Wire up the production clients from a validated configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let retry = RetryPolicy::new(
            config.migration.get_max_retries(),
            config.migration.get_retry_base_delay(),
        );

        let source = Arc::new(MondayClient::new(&config.source, retry));
        let sheet = Arc::new(SheetsClient::new(&config.target, retry));
        let stores = Arc::new(DriveClientFactory::new(config.target.clone(), retry));
        let fetcher = Arc::new(HttpFetcher::new(retry));
        let engine = TransferEngine::new(
            fetcher,
            stores,
            TransferConfig {
                workers: config.migration.get_workers(),
                compress_threshold: config.migration.get_compress_threshold(),
            },
        );
        let notifier: Option<Arc<dyn Notifier>> = config
            .slack
            .as_ref()
            .map(|slack| Arc::new(SlackNotifier::new(slack, retry)) as Arc<dyn Notifier>);
        let cursor = ProgressCursor::load(config.migration.get_state_file())?;

        Ok(Self::new(
            source,
            sheet,
            engine,
            notifier,
            cursor,
            config.migration.mode,
        )
        .with_page_size(config.source.page_size))
    }

    pub fn new(
        source: Arc<dyn BoardSource>,
        sheet: Arc<dyn RowSheet>,
        engine: TransferEngine,
        notifier: Option<Arc<dyn Notifier>>,
        cursor: ProgressCursor,
        mode: TargetMode,
    ) -> Self {
        Self {
            source,
            sheet,
            engine,
            notifier,
            cursor,
            mode,
            page_size: 25,
        }
    }

    /// Set the source page limit. Must match what the [`BoardSource`]
    /// actually returns per page; the stream's fast-forward pruning relies
    /// on it.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Run the migration to completion, cancellation, or a fatal error.
    ///
    /// Per-item failures are tallied in the result, not returned as
    /// errors; only failures that make continuing pointless (source
    /// unreachable, state file unwritable, unrecoverable cursor expiry)
    /// abort the run.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<MigrationResult> {
        let started = std::time::Instant::now();
        let mut registry = DuplicateRegistry::build(&*self.sheet).await?;
        let mut stream = ItemStream::starting_at(
            Arc::clone(&self.source),
            self.cursor.offset(),
            self.page_size,
        );
        let mut result = MigrationResult {
            started_at: chrono::Utc::now().to_rfc3339(),
            final_offset: self.cursor.offset(),
            ..MigrationResult::default()
        };

        // Set at the first failed item; from then on the cursor is frozen
        // and completions are recorded in the sheet only.
        let mut cursor_blocked = false;

        info!(
            offset = self.cursor.offset(),
            known_items = registry.len(),
            mode = ?self.mode,
            "Starting migration run"
        );

        loop {
            // Biased so a pending cancellation always wins over the next
            // page fetch.
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Cancellation requested, stopping after committed work");
                    result.cancelled = true;
                    break;
                }
                next = stream.next() => next?,
            };
            let Some((index, item)) = next else {
                break;
            };
            result.items_seen += 1;

            if registry.contains(&item.id) {
                info!(item_id = %item.id, index, "Skipping already-migrated item");
                result.items_skipped += 1;
                self.advance(index + 1, cursor_blocked, &mut result)?;
                continue;
            }

            let assets: Vec<_> = item
                .assets
                .iter()
                .filter(|a| a.matches_mode(self.mode))
                .cloned()
                .collect();
            if assets.is_empty() {
                info!(item_id = %item.id, index, "Item has no matching assets, skipping");
                result.items_skipped += 1;
                self.advance(index + 1, cursor_blocked, &mut result)?;
                continue;
            }

            if self.migrate_item(&item, assets, &mut result).await? {
                registry.insert(item.id.clone());
                result.items_migrated += 1;
                self.advance(index + 1, cursor_blocked, &mut result)?;
            } else {
                result.items_failed += 1;
                result.failed_items.push(item.name.clone());
                if !cursor_blocked {
                    warn!(
                        item_id = %item.id,
                        index,
                        "Item failed, freezing progress cursor at {}",
                        self.cursor.offset()
                    );
                    cursor_blocked = true;
                }
            }
        }

        result.duration_seconds = started.elapsed().as_secs_f64();
        info!(
            migrated = result.items_migrated,
            skipped = result.items_skipped,
            failed = result.items_failed,
            final_offset = result.final_offset,
            "Migration run finished in {:.2}s",
            result.duration_seconds
        );

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.run_finished(&result).await {
                warn!("Run summary notification failed: {}", e);
            }
        }

        Ok(result)
    }

    /// Transfer one item's assets and append its row. Returns whether the
    /// item committed. Only state-file errors propagate.
    async fn migrate_item(
        &self,
        item: &Item,
        assets: Vec<Asset>,
        result: &mut MigrationResult,
    ) -> Result<bool> {
        info!(item_id = %item.id, name = %item.name, assets = assets.len(), "Migrating item");

        let transfers = self.engine.transfer_item(&item.name, assets).await;
        if !transfers.iter().all(|t| t.is_success()) {
            let failed = transfers.iter().filter(|t| !t.is_success()).count();
            error!(
                item_id = %item.id,
                failed,
                total = transfers.len(),
                "Item left incomplete, no row appended"
            );
            return Ok(false);
        }

        // All transfers succeeded; links are already in asset order.
        let mut links = Vec::with_capacity(transfers.len());
        let mut bytes = 0u64;
        for transfer in &transfers {
            if let TransferOutcome::Success {
                link,
                bytes_uploaded,
            } = &transfer.outcome
            {
                links.push(link.clone());
                bytes += bytes_uploaded;
            }
        }

        let row = DestinationRow::new(item, links);
        if let Err(e) = self.sheet.append_row(&row).await {
            error!(item_id = %item.id, "Row append failed: {}", e);
            return Ok(false);
        }

        // Fire-and-forget: the item is committed once its row is in.
        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.item_migrated(&row.item_name, &row.links).await {
                warn!(item_id = %item.id, "Item notification failed: {}", e);
            }
        }

        result.assets_transferred += transfers.len();
        result.bytes_uploaded += bytes;
        Ok(true)
    }

    /// Advance the cursor to `offset` unless a failure froze it.
    fn advance(
        &mut self,
        offset: usize,
        cursor_blocked: bool,
        result: &mut MigrationResult,
    ) -> Result<()> {
        if cursor_blocked {
            return Ok(());
        }
        self.cursor.advance_to(offset)?;
        result.final_offset = offset;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MigrateError, Result};
    use crate::source::{Asset, Page};
    use crate::target::{FileStore, FileStoreFactory};
    use crate::transfer::AssetFetcher;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn item(id: &str, asset_names: &[&str]) -> Item {
        Item {
            id: id.to_string(),
            name: format!("Item {}", id),
            assets: asset_names
                .iter()
                .map(|name| Asset {
                    id: format!("{}-{}", id, name),
                    name: name.to_string(),
                    public_url: Some(format!("https://src/{}/{}", id, name)),
                    file_extension: name.rsplit('.').next().map(|e| format!(".{}", e)),
                    file_size: None,
                })
                .collect(),
        }
    }

    struct PagedSource {
        pages: Vec<Vec<Item>>,
    }

    #[async_trait]
    impl BoardSource for PagedSource {
        async fn fetch_page(&self, cursor: Option<&str>, _include_assets: bool) -> Result<Page> {
            let index = match cursor {
                None => 0,
                Some(c) => c.parse::<usize>().map_err(|e| {
                    MigrateError::Source(e.to_string())
                })?,
            };
            let next = if index + 1 < self.pages.len() {
                Some((index + 1).to_string())
            } else {
                None
            };
            Ok(Page {
                items: self.pages[index].clone(),
                cursor: next,
            })
        }
    }

    struct MemorySheet {
        ids: Mutex<Vec<String>>,
        rows: Mutex<Vec<DestinationRow>>,
        fail_appends: bool,
    }

    impl MemorySheet {
        fn with_ids(ids: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                ids: Mutex::new(ids.iter().map(|s| s.to_string()).collect()),
                rows: Mutex::new(Vec::new()),
                fail_appends: false,
            })
        }

        fn failing_appends() -> Arc<Self> {
            Arc::new(Self {
                ids: Mutex::new(Vec::new()),
                rows: Mutex::new(Vec::new()),
                fail_appends: true,
            })
        }

        fn row_ids(&self) -> Vec<String> {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.item_id.clone())
                .collect()
        }
    }

    #[async_trait]
    impl RowSheet for MemorySheet {
        async fn list_item_ids(&self) -> Result<Vec<String>> {
            Ok(self.ids.lock().unwrap().clone())
        }

        async fn append_row(&self, row: &DestinationRow) -> Result<()> {
            if self.fail_appends {
                return Err(MigrateError::Sheet("append rejected".into()));
            }
            self.ids.lock().unwrap().push(row.item_id.clone());
            self.rows.lock().unwrap().push(row.clone());
            Ok(())
        }
    }

    struct MemoryStoreFactory {
        uploads: Arc<Mutex<Vec<String>>>,
    }

    struct MemoryStore {
        uploads: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl FileStore for MemoryStore {
        async fn find_existing(&self, _filename: &str) -> Result<Option<String>> {
            Ok(None)
        }

        async fn upload(&self, filename: &str, _bytes: Vec<u8>) -> Result<String> {
            self.uploads.lock().unwrap().push(filename.to_string());
            Ok(format!("https://dst/{}", filename))
        }
    }

    impl FileStoreFactory for MemoryStoreFactory {
        fn create(&self) -> Arc<dyn FileStore> {
            Arc::new(MemoryStore {
                uploads: Arc::clone(&self.uploads),
            })
        }
    }

    struct CountingFetcher {
        calls: AtomicUsize,
        fail_assets: HashSet<String>,
    }

    impl CountingFetcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_assets: HashSet::new(),
            })
        }

        fn failing_on(name: &str) -> Arc<Self> {
            let mut fail_assets = HashSet::new();
            fail_assets.insert(name.to_string());
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_assets,
            })
        }
    }

    #[async_trait]
    impl AssetFetcher for CountingFetcher {
        async fn fetch(&self, asset: &Asset) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_assets.contains(&asset.name) {
                return Err(MigrateError::transfer(&asset.name, "download failed"));
            }
            Ok(vec![1, 2, 3])
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        items: Mutex<Vec<(String, Vec<String>)>>,
        summaries: AtomicUsize,
        fail_items: bool,
    }

    impl RecordingNotifier {
        fn failing_items() -> Self {
            Self {
                fail_items: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn item_migrated(&self, item_name: &str, links: &[String]) -> Result<()> {
            self.items
                .lock()
                .unwrap()
                .push((item_name.to_string(), links.to_vec()));
            if self.fail_items {
                return Err(MigrateError::Notify("channel_not_found".into()));
            }
            Ok(())
        }

        async fn run_finished(&self, _result: &MigrationResult) -> Result<()> {
            self.summaries.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        sheet: Arc<MemorySheet>,
        fetcher: Arc<CountingFetcher>,
        uploads: Arc<Mutex<Vec<String>>>,
        state_path: std::path::PathBuf,
        _dir: TempDir,
    }

    impl Harness {
        fn orchestrator(&self, pages: Vec<Vec<Item>>, mode: TargetMode) -> Orchestrator {
            let factory = Arc::new(MemoryStoreFactory {
                uploads: Arc::clone(&self.uploads),
            });
            let engine = TransferEngine::new(
                Arc::clone(&self.fetcher) as Arc<dyn AssetFetcher>,
                factory,
                TransferConfig {
                    workers: 5,
                    compress_threshold: u64::MAX,
                },
            );
            Orchestrator::new(
                Arc::new(PagedSource { pages }),
                Arc::clone(&self.sheet) as Arc<dyn RowSheet>,
                engine,
                None,
                ProgressCursor::load(&self.state_path).unwrap(),
                mode,
            )
        }

        fn saved_offset(&self) -> usize {
            ProgressCursor::load(&self.state_path).unwrap().offset()
        }
    }

    fn harness(sheet: Arc<MemorySheet>, fetcher: Arc<CountingFetcher>) -> Harness {
        let dir = TempDir::new().unwrap();
        let state_path = dir.path().join("state.txt");
        Harness {
            sheet,
            fetcher,
            uploads: Arc::new(Mutex::new(Vec::new())),
            state_path,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_mixed_board_with_known_item() {
        // Board of three items where the second already has a row. The
        // pool runs for the first and third only; the cursor ends past
        // all three and exactly two rows are appended.
        let h = harness(MemorySheet::with_ids(&["I2"]), CountingFetcher::new());
        let mut orch = h.orchestrator(
            vec![vec![
                item("I1", &["a.bin"]),
                item("I2", &["b.bin"]),
                item("I3", &["c.bin"]),
            ]],
            TargetMode::All,
        );

        let result = orch.run(CancellationToken::new()).await.unwrap();
        assert_eq!(result.items_migrated, 2);
        assert_eq!(result.items_skipped, 1);
        assert_eq!(result.items_failed, 0);
        assert_eq!(result.final_offset, 3);
        assert_eq!(h.saved_offset(), 3);
        assert_eq!(h.sheet.row_ids(), vec!["I1", "I3"]);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_item_appends_no_row_and_freezes_cursor() {
        let h = harness(
            MemorySheet::with_ids(&[]),
            CountingFetcher::failing_on("bad.bin"),
        );
        let mut orch = h.orchestrator(
            vec![vec![
                item("I1", &["ok.bin", "bad.bin"]),
                item("I2", &["fine.bin"]),
            ]],
            TargetMode::All,
        );

        let result = orch.run(CancellationToken::new()).await.unwrap();
        assert_eq!(result.items_failed, 1);
        assert_eq!(result.items_migrated, 1);
        // I2 committed a row but the cursor stays before I1.
        assert_eq!(h.sheet.row_ids(), vec!["I2"]);
        assert_eq!(result.final_offset, 0);
        assert_eq!(h.saved_offset(), 0);
    }

    #[tokio::test]
    async fn test_rerun_converges_without_duplicate_rows() {
        let h = harness(MemorySheet::with_ids(&[]), CountingFetcher::new());
        let pages = vec![vec![item("I1", &["a.bin"]), item("I2", &["b.bin"])]];

        let mut first = h.orchestrator(pages.clone(), TargetMode::All);
        let result = first.run(CancellationToken::new()).await.unwrap();
        assert_eq!(result.items_migrated, 2);

        let mut second = h.orchestrator(pages, TargetMode::All);
        let result = second.run(CancellationToken::new()).await.unwrap();
        assert_eq!(result.items_migrated, 0);
        assert_eq!(result.items_seen, 0, "resumed past the whole board");
        assert_eq!(h.sheet.row_ids(), vec!["I1", "I2"]);
    }

    #[tokio::test]
    async fn test_resumes_from_saved_cursor() {
        let h = harness(MemorySheet::with_ids(&[]), CountingFetcher::new());
        std::fs::write(&h.state_path, "2\n").unwrap();

        let mut orch = h.orchestrator(
            vec![
                vec![item("I1", &["a.bin"]), item("I2", &["b.bin"])],
                vec![item("I3", &["c.bin"])],
            ],
            TargetMode::All,
        );
        let result = orch.run(CancellationToken::new()).await.unwrap();
        assert_eq!(result.items_seen, 1);
        assert_eq!(h.sheet.row_ids(), vec!["I3"]);
        assert_eq!(h.saved_offset(), 3);
    }

    #[tokio::test]
    async fn test_item_without_matching_assets_skipped_without_row() {
        let h = harness(MemorySheet::with_ids(&[]), CountingFetcher::new());
        let mut orch = h.orchestrator(
            vec![vec![item("I1", &[]), item("I2", &["keep.bin"])]],
            TargetMode::All,
        );
        let result = orch.run(CancellationToken::new()).await.unwrap();
        assert_eq!(result.items_skipped, 1);
        assert_eq!(result.items_migrated, 1);
        assert_eq!(h.sheet.row_ids(), vec!["I2"]);
        assert_eq!(h.saved_offset(), 2);
    }

    #[tokio::test]
    async fn test_mode_filters_assets() {
        // Docs mode: the image-only item is skipped, the mixed item
        // migrates only its document.
        let h = harness(MemorySheet::with_ids(&[]), CountingFetcher::new());
        let mut orch = h.orchestrator(
            vec![vec![
                item("I1", &["photo.png"]),
                item("I2", &["notes.pdf", "shot.jpg"]),
            ]],
            TargetMode::Docs,
        );
        let result = orch.run(CancellationToken::new()).await.unwrap();
        assert_eq!(result.items_skipped, 1);
        assert_eq!(result.items_migrated, 1);
        assert_eq!(result.assets_transferred, 1);
        let uploads = h.uploads.lock().unwrap();
        assert_eq!(uploads.as_slice(), ["Item I2_notes.pdf"]);
    }

    #[tokio::test]
    async fn test_row_append_failure_fails_item() {
        let h = harness(MemorySheet::failing_appends(), CountingFetcher::new());
        let mut orch = h.orchestrator(vec![vec![item("I1", &["a.bin"])]], TargetMode::All);
        let result = orch.run(CancellationToken::new()).await.unwrap();
        assert_eq!(result.items_failed, 1);
        assert_eq!(result.items_migrated, 0);
        assert_eq!(h.saved_offset(), 0);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_stops_before_processing() {
        let h = harness(MemorySheet::with_ids(&[]), CountingFetcher::new());
        let mut orch = h.orchestrator(vec![vec![item("I1", &["a.bin"])]], TargetMode::All);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = orch.run(cancel).await.unwrap();
        assert!(result.cancelled);
        assert_eq!(result.items_seen, 0);
        assert!(h.sheet.row_ids().is_empty());
    }

    #[tokio::test]
    async fn test_notifier_gets_one_message_per_committed_item() {
        // I2 is already in the sheet and I3 fails: neither produces an
        // item message. The two committed items each get one, with links
        // in asset order, and the summary is posted exactly once.
        let h = harness(
            MemorySheet::with_ids(&["I2"]),
            CountingFetcher::failing_on("bad.bin"),
        );
        let recorder = Arc::new(RecordingNotifier::default());
        let mut orch = h.orchestrator(
            vec![vec![
                item("I1", &["a.bin", "b.bin"]),
                item("I2", &["c.bin"]),
                item("I3", &["bad.bin"]),
                item("I4", &["d.bin"]),
            ]],
            TargetMode::All,
        );
        orch.notifier = Some(Arc::clone(&recorder) as Arc<dyn Notifier>);

        let result = orch.run(CancellationToken::new()).await.unwrap();
        assert_eq!(result.items_migrated, 2);

        let items = recorder.items.lock().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].0, "Item I1");
        assert_eq!(
            items[0].1,
            vec!["https://dst/Item I1_a.bin", "https://dst/Item I1_b.bin"]
        );
        assert_eq!(items[1].0, "Item I4");
        assert_eq!(recorder.summaries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_notifier_error_does_not_fail_item() {
        let h = harness(MemorySheet::with_ids(&[]), CountingFetcher::new());
        let mut orch = h.orchestrator(vec![vec![item("I1", &["a.bin"])]], TargetMode::All);
        orch.notifier = Some(Arc::new(RecordingNotifier::failing_items()));

        let result = orch.run(CancellationToken::new()).await.unwrap();
        assert_eq!(result.items_migrated, 1);
        assert_eq!(result.items_failed, 0);
        assert_eq!(h.sheet.row_ids(), vec!["I1"]);
        assert_eq!(h.saved_offset(), 1);
    }

    #[tokio::test]
    async fn test_links_follow_asset_order() {
        let h = harness(MemorySheet::with_ids(&[]), CountingFetcher::new());
        let names = ["z.bin", "a.bin", "m.bin", "q.bin", "b.bin", "c.bin"];
        let mut orch = h.orchestrator(vec![vec![item("I1", &names)]], TargetMode::All);
        orch.run(CancellationToken::new()).await.unwrap();

        let rows = h.sheet.rows.lock().unwrap();
        let expected: Vec<String> = names
            .iter()
            .map(|n| format!("https://dst/Item I1_{}", n))
            .collect();
        assert_eq!(rows[0].links, expected);
    }
}
