//! Migration event notifications.

use crate::config::SlackConfig;
use crate::core::RetryPolicy;
use crate::error::{MigrateError, Result};
use crate::orchestrator::MigrationResult;
use async_trait::async_trait;
use serde::Deserialize;

/// Delivery of migration events to an external channel. Failures here are
/// reported but never fail the migration itself.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// One item committed: its name and destination links in asset order.
    async fn item_migrated(&self, item_name: &str, links: &[String]) -> Result<()>;

    /// End-of-run summary.
    async fn run_finished(&self, result: &MigrationResult) -> Result<()>;
}

const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

/// Posts Block Kit messages to a Slack channel: one per migrated item
/// plus a run summary.
pub struct SlackNotifier {
    http: reqwest::Client,
    token: String,
    channel: String,
    retry: RetryPolicy,
}

impl SlackNotifier {
    pub fn new(config: &SlackConfig, retry: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: config.token.clone(),
            channel: config.channel.clone(),
            retry,
        }
    }

    fn build_item_message(&self, item_name: &str, links: &[String]) -> serde_json::Value {
        let link_lines = if links.is_empty() {
            "(no files)".to_string()
        } else {
            links
                .iter()
                .map(|link| format!("• {}", link))
                .collect::<Vec<_>>()
                .join("\n")
        };
        serde_json::json!({
            "channel": self.channel,
            "text": format!("Migrated '{}' ({} files)", item_name, links.len()),
            "blocks": [
                {
                    "type": "section",
                    "text": {
                        "type": "mrkdwn",
                        "text": format!("*Migrated:* {}\n{}", item_name, link_lines)
                    }
                }
            ]
        })
    }

    fn build_run_summary(&self, result: &MigrationResult) -> serde_json::Value {
        let headline = if result.items_failed == 0 {
            "Board migration completed"
        } else {
            "Board migration completed with failures"
        };
        serde_json::json!({
            "channel": self.channel,
            "text": format!(
                "{}: {} migrated, {} skipped, {} failed",
                headline, result.items_migrated, result.items_skipped, result.items_failed
            ),
            "blocks": [
                {
                    "type": "header",
                    "text": { "type": "plain_text", "text": headline }
                },
                {
                    "type": "section",
                    "fields": [
                        { "type": "mrkdwn", "text": format!("*Migrated:* {}", result.items_migrated) },
                        { "type": "mrkdwn", "text": format!("*Skipped:* {}", result.items_skipped) },
                        { "type": "mrkdwn", "text": format!("*Failed:* {}", result.items_failed) },
                        { "type": "mrkdwn", "text": format!("*Files uploaded:* {}", result.assets_transferred) }
                    ]
                }
            ]
        })
    }

    async fn post(&self, message: &serde_json::Value) -> Result<()> {
        let response = self
            .http
            .post(POST_MESSAGE_URL)
            .bearer_auth(&self.token)
            .json(message)
            .send()
            .await?
            .error_for_status()?;

        let ack: SlackAck = response.json().await?;
        if ack.ok {
            Ok(())
        } else {
            Err(MigrateError::Notify(
                ack.error.unwrap_or_else(|| "unknown slack error".into()),
            ))
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn item_migrated(&self, item_name: &str, links: &[String]) -> Result<()> {
        let message = self.build_item_message(item_name, links);
        self.retry
            .run("slack item notification", || self.post(&message))
            .await
    }

    async fn run_finished(&self, result: &MigrationResult) -> Result<()> {
        let message = self.build_run_summary(result);
        self.retry
            .run("slack run summary", || self.post(&message))
            .await
    }
}

#[derive(Debug, Deserialize)]
struct SlackAck {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}
