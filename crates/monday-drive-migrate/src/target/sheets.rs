//! Google Sheets REST client for the destination row log.

use super::{DestinationRow, RowSheet};
use crate::config::TargetConfig;
use crate::core::RetryPolicy;
use crate::error::{MigrateError, Result};
use crate::source::ItemId;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

const SHEETS_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Range holding item IDs, one per migrated item.
const ID_COLUMN_RANGE: &str = "B:B";

pub struct SheetsClient {
    http: reqwest::Client,
    access_token: String,
    spreadsheet_id: String,
    retry: RetryPolicy,
}

impl SheetsClient {
    pub fn new(config: &TargetConfig, retry: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token: config.access_token.clone(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            retry,
        }
    }

    async fn fetch_id_column(&self) -> Result<Vec<ItemId>> {
        let url = format!(
            "{}/{}/values/{}",
            SHEETS_URL, self.spreadsheet_id, ID_COLUMN_RANGE
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let response = Self::check(response, "id column read").await?;

        let body: ValueRange = response.json().await?;
        let ids = body
            .values
            .into_iter()
            .filter_map(|mut row| {
                if row.is_empty() {
                    None
                } else {
                    Some(row.remove(0))
                }
            })
            .filter(|cell| !cell.is_empty())
            .collect();
        Ok(ids)
    }

    async fn do_append(&self, cells: &[String]) -> Result<()> {
        let url = format!(
            "{}/{}/values/A1:append",
            SHEETS_URL, self.spreadsheet_id
        );
        let body = serde_json::json!({ "values": [cells] });
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&body)
            .send()
            .await?;
        Self::check(response, "row append").await?;
        Ok(())
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        Err(MigrateError::Sheet(format!(
            "{} failed with {}: {}",
            what, status, detail
        )))
    }
}

#[async_trait]
impl RowSheet for SheetsClient {
    async fn list_item_ids(&self) -> Result<Vec<ItemId>> {
        self.retry
            .run("sheet id column read", || self.fetch_id_column())
            .await
    }

    async fn append_row(&self, row: &DestinationRow) -> Result<()> {
        let cells = row.to_cells();
        self.retry
            .run("sheet row append", || self.do_append(&cells))
            .await?;
        debug!(item_id = %row.item_id, "Appended destination row");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}
