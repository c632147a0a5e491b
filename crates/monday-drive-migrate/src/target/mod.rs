//! Destination seams: file storage and the append-only row log.

pub mod drive;
pub mod sheets;

pub use drive::{DriveClient, DriveClientFactory};
pub use sheets::SheetsClient;

use crate::error::Result;
use crate::source::{Item, ItemId};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// One row of the destination log: the durable record that an item's
/// migration is complete. Column order is fixed; the item ID column feeds
/// the duplicate registry on later runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationRow {
    pub item_name: String,
    pub item_id: ItemId,
    /// Migration date, `YYYY-MM-DD`.
    pub migrated_on: String,
    /// Destination links in the item's original asset order.
    pub links: Vec<String>,
}

impl DestinationRow {
    /// Row for `item` migrated today, with `links` already in asset order.
    pub fn new(item: &Item, links: Vec<String>) -> Self {
        Self {
            item_name: item.name.clone(),
            item_id: item.id.clone(),
            migrated_on: Utc::now().format("%Y-%m-%d").to_string(),
            links,
        }
    }

    /// Cell values in sheet column order.
    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.item_name.clone(),
            self.item_id.clone(),
            self.migrated_on.clone(),
            self.links.join(", "),
        ]
    }
}

/// Destination file storage.
///
/// Implementations are not required to be internally synchronized beyond
/// `Send + Sync`; the worker pool gives each slot its own instance via
/// [`FileStoreFactory`] so uploads from different slots never share
/// connection state.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Link to an existing non-trashed file with this exact name in the
    /// destination folder, if any.
    async fn find_existing(&self, filename: &str) -> Result<Option<String>>;

    /// Upload `bytes` as `filename` and return the shareable link.
    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<String>;
}

/// Creates one [`FileStore`] per worker-pool slot.
pub trait FileStoreFactory: Send + Sync {
    fn create(&self) -> Arc<dyn FileStore>;
}

/// Append-only destination row log.
#[async_trait]
pub trait RowSheet: Send + Sync {
    /// Every item ID recorded in the log's item-ID column.
    async fn list_item_ids(&self) -> Result<Vec<ItemId>>;

    /// Append one row at the bottom of the log.
    async fn append_row(&self, row: &DestinationRow) -> Result<()>;
}
