//! # monday-drive-migrate
//!
//! Resumable migration of a Monday.com board's items and file assets into
//! Google Drive (files) and Google Sheets (a tabular log), with optional
//! Slack notification.
//!
//! The library is built around:
//!
//! - **Cursor pagination with recovery**: Monday's pagination cursors
//!   expire; the item stream transparently re-queries and fast-forwards.
//! - **Dual dedup authorities**: a persisted progress offset plus a
//!   startup-built registry of ids already present in the destination sheet.
//! - **Bounded per-item fan-out**: one item's assets are transferred in
//!   parallel across a fixed pool of isolated Drive clients; items
//!   themselves are strictly sequential.
//! - **Idempotent convergence**: re-running after any interruption never
//!   duplicates rows or files and never skips an uncommitted item.
//!
//! ## Example
//!
//! ```rust,no_run
//! use monday_drive_migrate::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> monday_drive_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let mut orchestrator = Orchestrator::from_config(&config)?;
//!     let result = orchestrator.run(CancellationToken::new()).await?;
//!     println!("Migrated {} items", result.items_migrated);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod registry;
pub mod source;
pub mod state;
pub mod target;
pub mod transfer;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SlackConfig, SourceConfig, TargetConfig, TargetMode};
pub use error::{MigrateError, Result};
pub use notify::{Notifier, SlackNotifier};
pub use orchestrator::{MigrationResult, Orchestrator};
pub use registry::DuplicateRegistry;
pub use source::{Asset, BoardSource, Item, ItemId, ItemStream, MondayClient, Page};
pub use state::ProgressCursor;
pub use target::{
    DestinationRow, DriveClient, DriveClientFactory, FileStore, FileStoreFactory, RowSheet,
    SheetsClient,
};
pub use transfer::{
    AssetFetcher, HttpFetcher, TransferConfig, TransferEngine, TransferOutcome, TransferResult,
};
