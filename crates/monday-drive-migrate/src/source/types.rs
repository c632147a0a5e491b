//! Board source data types.

use crate::config::TargetMode;
use serde::Deserialize;

/// Stable item identifier, unique across runs.
pub type ItemId = String;

/// One file attached to an item.
///
/// `public_url` is re-signed by the source per page fetch and expires; it
/// must never be cached across pages or runs.
#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default)]
    pub file_extension: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// Extensions treated as document-class attachments for mode filtering.
const DOC_EXTENSIONS: &[&str] = &["doc", "docx", "md", "txt", "pdf"];

impl Asset {
    /// Whether this asset is a document-class attachment.
    pub fn is_document(&self) -> bool {
        self.file_extension
            .as_deref()
            .map(|ext| {
                let ext = ext.trim_start_matches('.').to_ascii_lowercase();
                DOC_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false)
    }

    /// Whether this asset belongs to the given operating mode.
    pub fn matches_mode(&self, mode: TargetMode) -> bool {
        match mode {
            TargetMode::All => true,
            TargetMode::Docs => self.is_document(),
            TargetMode::Files => !self.is_document(),
        }
    }
}

/// One record from the source board, the unit of migration.
#[derive(Debug, Clone, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// One page of items plus the cursor for the next page.
///
/// A `None` cursor signals exhaustion.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<Item>,
    pub cursor: Option<String>,
}
