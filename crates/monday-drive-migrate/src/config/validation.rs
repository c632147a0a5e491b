//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.api_token.is_empty() {
        return Err(MigrateError::Config("source.api_token is required".into()));
    }
    if config.source.board_id.is_empty() {
        return Err(MigrateError::Config("source.board_id is required".into()));
    }
    if !config.source.board_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(MigrateError::Config(format!(
            "source.board_id must be numeric, got '{}'",
            config.source.board_id
        )));
    }
    if config.source.page_size == 0 || config.source.page_size > 500 {
        return Err(MigrateError::Config(
            "source.page_size must be between 1 and 500".into(),
        ));
    }

    // Target validation
    if config.target.access_token.is_empty() {
        return Err(MigrateError::Config("target.access_token is required".into()));
    }
    if config.target.drive_folder_id.is_empty() {
        return Err(MigrateError::Config(
            "target.drive_folder_id is required".into(),
        ));
    }
    if config.target.spreadsheet_id.is_empty() {
        return Err(MigrateError::Config(
            "target.spreadsheet_id is required".into(),
        ));
    }

    // Slack validation - only when the section is present
    if let Some(slack) = &config.slack {
        if slack.token.is_empty() || slack.channel.is_empty() {
            return Err(MigrateError::Config(
                "slack.token and slack.channel are both required when slack is configured".into(),
            ));
        }
    }

    // Migration config validation - only check if explicitly set
    if let Some(0) = config.migration.workers {
        return Err(MigrateError::Config(
            "migration.workers must be at least 1".into(),
        ));
    }
    if let Some(0) = config.migration.max_retries {
        return Err(MigrateError::Config(
            "migration.max_retries must be at least 1".into(),
        ));
    }

    Ok(())
}
