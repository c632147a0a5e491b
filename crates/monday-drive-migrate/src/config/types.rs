//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Board source configuration (Monday.com).
    pub source: SourceConfig,

    /// Destination configuration (Google Drive + Sheets).
    pub target: TargetConfig,

    /// Slack notification configuration. Notifications are disabled when
    /// this section is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack: Option<SlackConfig>,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Board source (Monday.com) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// GraphQL endpoint (default: the public Monday v2 API).
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API token. Never serialized back out.
    #[serde(skip_serializing)]
    pub api_token: String,

    /// Board identifier.
    pub board_id: String,

    /// Items per page (default: 25).
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("api_url", &self.api_url)
            .field("api_token", &"[REDACTED]")
            .field("board_id", &self.board_id)
            .field("page_size", &self.page_size)
            .finish()
    }
}

/// Destination (Google Drive + Sheets) configuration.
///
/// The access token is a ready-to-use bearer token; obtaining one (service
/// account flow, token refresh) is outside this tool.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// OAuth2 bearer token for Drive and Sheets. Never serialized back out.
    #[serde(skip_serializing)]
    pub access_token: String,

    /// Drive folder receiving uploaded files.
    pub drive_folder_id: String,

    /// Spreadsheet receiving one row per migrated item.
    pub spreadsheet_id: String,
}

impl std::fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetConfig")
            .field("access_token", &"[REDACTED]")
            .field("drive_folder_id", &self.drive_folder_id)
            .field("spreadsheet_id", &self.spreadsheet_id)
            .finish()
    }
}

/// Slack notification configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Bot token. Never serialized back out.
    #[serde(skip_serializing)]
    pub token: String,

    /// Channel to post to.
    pub channel: String,
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("token", &"[REDACTED]")
            .field("channel", &self.channel)
            .finish()
    }
}

/// Migration behavior configuration.
/// Performance-related fields use Option<T> to distinguish between
/// "not set" (use default) and "explicitly set" (use provided value).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MigrationConfig {
    /// Worker pool width for per-item asset transfers (default: 5).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Images above this byte size are recompressed (default: 1 MiB).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress_threshold_bytes: Option<u64>,

    /// Maximum attempts per network operation (default: 3).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<usize>,

    /// Base delay between retries, doubled each attempt (default: 1000ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_base_delay_ms: Option<u64>,

    /// Progress state file path (default: migration_state.txt).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,

    /// Which asset classes are migrated (default: all).
    #[serde(default)]
    pub mode: TargetMode,
}

impl MigrationConfig {
    // Accessor methods that return the effective value (with fallback defaults)

    pub fn get_workers(&self) -> usize {
        self.workers.unwrap_or(5)
    }

    pub fn get_compress_threshold(&self) -> u64 {
        self.compress_threshold_bytes.unwrap_or(1024 * 1024)
    }

    pub fn get_max_retries(&self) -> usize {
        self.max_retries.unwrap_or(3)
    }

    pub fn get_retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms.unwrap_or(1000))
    }

    pub fn get_state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| PathBuf::from("migration_state.txt"))
    }
}

/// Which asset classes are dispatched to the worker pool.
///
/// Registry, cursor and sheet semantics are identical in every mode; the
/// mode only filters the assets considered for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    /// Ordinary file attachments only.
    Files,

    /// Document-class attachments only (doc, docx, md, txt, pdf).
    Docs,

    /// Everything.
    #[default]
    All,
}

// Default value functions for serde

fn default_api_url() -> String {
    "https://api.monday.com/v2".to_string()
}

fn default_page_size() -> usize {
    25
}
