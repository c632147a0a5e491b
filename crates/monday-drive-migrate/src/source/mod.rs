//! Remote item source: Monday.com GraphQL pagination.

mod stream;
mod types;

pub use stream::ItemStream;
pub use types::{Asset, Item, ItemId, Page};

use crate::config::SourceConfig;
use crate::core::RetryPolicy;
use crate::error::{MigrateError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

/// Cursor-paginated source of board items.
///
/// `include_assets` lets callers skip the asset sub-query while
/// fast-forwarding past already-processed items; asset URLs are ephemeral
/// and must be fetched fresh on the pages that will actually be processed.
#[async_trait]
pub trait BoardSource: Send + Sync {
    /// Fetch one page. `None` cursor means the first page of the board's
    /// current cursor chain. Returns [`MigrateError::CursorExpired`] when
    /// the remote reports an expired cursor.
    async fn fetch_page(&self, cursor: Option<&str>, include_assets: bool) -> Result<Page>;
}

/// Monday.com GraphQL client.
pub struct MondayClient {
    http: reqwest::Client,
    api_url: String,
    api_token: String,
    board_id: String,
    page_size: usize,
    retry: RetryPolicy,
}

impl MondayClient {
    pub fn new(config: &SourceConfig, retry: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_token: config.api_token.clone(),
            board_id: config.board_id.clone(),
            page_size: config.page_size,
            retry,
        }
    }

    fn asset_fields(include_assets: bool) -> &'static str {
        if include_assets {
            "assets { id name public_url file_extension file_size }"
        } else {
            ""
        }
    }

    fn build_query(&self, cursor: Option<&str>, include_assets: bool) -> serde_json::Value {
        let assets = Self::asset_fields(include_assets);
        match cursor {
            Some(cursor) => json!({
                "query": format!(
                    "query ($cursor: String!) {{ next_items_page (cursor: $cursor, limit: {}) \
                     {{ cursor items {{ id name {} }} }} }}",
                    self.page_size, assets
                ),
                "variables": { "cursor": cursor },
            }),
            None => json!({
                "query": format!(
                    "query {{ boards (ids: {}) {{ items_page (limit: {}) \
                     {{ cursor items {{ id name {} }} }} }} }}",
                    self.board_id, self.page_size, assets
                ),
            }),
        }
    }

    async fn post(&self, body: &serde_json::Value) -> Result<GraphqlResponse> {
        let response = self
            .http
            .post(&self.api_url)
            .header("Authorization", &self.api_token)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl BoardSource for MondayClient {
    async fn fetch_page(&self, cursor: Option<&str>, include_assets: bool) -> Result<Page> {
        let body = self.build_query(cursor, include_assets);
        let response = self.retry.run("board page fetch", || self.post(&body)).await?;

        if let Some(errors) = response.errors {
            if errors
                .iter()
                .any(|e| e.message.contains("CursorExpiredError"))
            {
                warn!("Board source reported an expired pagination cursor");
                return Err(MigrateError::CursorExpired);
            }
            let messages: Vec<_> = errors.into_iter().map(|e| e.message).collect();
            return Err(MigrateError::Source(messages.join("; ")));
        }

        let data = response
            .data
            .ok_or_else(|| MigrateError::Source("response contains no data".into()))?;

        let items_page = match cursor {
            Some(_) => data.next_items_page,
            None => data
                .boards
                .and_then(|mut boards| boards.drain(..).next())
                .and_then(|board| board.items_page),
        };

        let items_page = items_page
            .ok_or_else(|| MigrateError::Source("response contains no items page".into()))?;

        Ok(Page {
            items: items_page.items,
            cursor: items_page.cursor,
        })
    }
}

// GraphQL response shapes.

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<ResponseData>,
    #[serde(default)]
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    #[serde(default)]
    boards: Option<Vec<Board>>,
    #[serde(default)]
    next_items_page: Option<ItemsPage>,
}

#[derive(Debug, Deserialize)]
struct Board {
    #[serde(default)]
    items_page: Option<ItemsPage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ItemsPage {
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    items: Vec<Item>,
}
