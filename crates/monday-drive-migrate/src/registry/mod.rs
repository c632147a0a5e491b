//! Duplicate registry built from the destination row log.
//!
//! The registry is the authoritative record of completed items: an item ID
//! appears in it exactly when that item's row was appended to the sheet,
//! and the row is appended only after every asset transfer succeeded. The
//! progress cursor is merely an optimization over this; whenever the two
//! disagree the registry wins and the item is skipped.

use crate::error::Result;
use crate::source::ItemId;
use crate::target::RowSheet;
use std::collections::HashSet;
use tracing::info;

/// Set of item IDs already migrated in previous runs (or earlier in this
/// one). Built once per run from the sheet's item-ID column.
pub struct DuplicateRegistry {
    seen: HashSet<ItemId>,
}

impl DuplicateRegistry {
    /// Build the registry by reading every item ID recorded in the sheet.
    pub async fn build(sheet: &dyn RowSheet) -> Result<Self> {
        let ids = sheet.list_item_ids().await?;
        let seen: HashSet<ItemId> = ids.into_iter().collect();
        info!(known_items = seen.len(), "Built duplicate registry from row log");
        Ok(Self { seen })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Record a completion made during this run.
    pub fn insert(&mut self, id: ItemId) {
        self.seen.insert(id);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
