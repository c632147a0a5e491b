//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP transport error (Monday, Drive, Sheets or Slack endpoint)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// GraphQL-level error from the board source
    #[error("Board source error: {0}")]
    Source(String),

    /// The board source's pagination cursor has expired
    #[error("Pagination cursor expired")]
    CursorExpired,

    /// A single asset failed to transfer after retries
    #[error("Transfer failed for asset {asset}: {message}")]
    Transfer { asset: String, message: String },

    /// Google Drive API error
    #[error("Drive error: {0}")]
    Drive(String),

    /// Google Sheets API error
    #[error("Sheet error: {0}")]
    Sheet(String),

    /// Notification delivery error (non-fatal to the migration)
    #[error("Notification error: {0}")]
    Notify(String),

    /// Progress state file error
    #[error("State file error: {0}")]
    State(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Transfer error.
    pub fn transfer(asset: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            asset: asset.into(),
            message: message.into(),
        }
    }

    /// Whether the retry policy may re-attempt the failed operation.
    ///
    /// Cursor expiry is deliberately not retryable: it has its own recovery
    /// path in the item stream and must propagate immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MigrateError::Http(_) | MigrateError::Drive(_) | MigrateError::Sheet(_)
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::Cancelled => 0,
            _ => 1,
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
