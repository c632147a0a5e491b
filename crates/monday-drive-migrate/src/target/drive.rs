//! Google Drive REST client.
//!
//! Covers the two operations the pipeline needs: an exact-name existence
//! check inside the destination folder, and a multipart upload that
//! returns the file's web link.

use super::{FileStore, FileStoreFactory};
use crate::config::TargetConfig;
use crate::core::RetryPolicy;
use crate::error::{MigrateError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";

pub struct DriveClient {
    http: reqwest::Client,
    access_token: String,
    folder_id: String,
    retry: RetryPolicy,
}

impl DriveClient {
    pub fn new(config: &TargetConfig, retry: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token: config.access_token.clone(),
            folder_id: config.drive_folder_id.clone(),
            retry,
        }
    }

    /// Escape a filename for embedding in a Drive search query, which uses
    /// single-quoted string literals.
    fn escape_query_value(name: &str) -> String {
        name.replace('\\', "\\\\").replace('\'', "\\'")
    }

    async fn search(&self, filename: &str) -> Result<Option<String>> {
        let query = format!(
            "name='{}' and '{}' in parents and trashed = false",
            Self::escape_query_value(filename),
            self.folder_id
        );
        let response = self
            .http
            .get(FILES_URL)
            .bearer_auth(&self.access_token)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id, webViewLink)"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ])
            .send()
            .await?;

        let response = Self::check(response, "file search").await?;
        let body: FileList = response.json().await?;
        Ok(body.files.into_iter().next().map(|f| f.web_view_link))
    }

    async fn do_upload(&self, filename: &str, bytes: Vec<u8>) -> Result<String> {
        let metadata = serde_json::json!({
            "name": filename,
            "parents": [self.folder_id],
        });

        let metadata_part = reqwest::multipart::Part::text(metadata.to_string())
            .mime_str("application/json")
            .map_err(|e| MigrateError::Drive(format!("metadata part: {}", e)))?;
        let media_part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| MigrateError::Drive(format!("media part: {}", e)))?;
        let form = reqwest::multipart::Form::new()
            .part("metadata", metadata_part)
            .part("file", media_part);

        let response = self
            .http
            .post(UPLOAD_URL)
            .bearer_auth(&self.access_token)
            .query(&[
                ("uploadType", "multipart"),
                ("fields", "webViewLink"),
                ("supportsAllDrives", "true"),
            ])
            .multipart(form)
            .send()
            .await?;

        let response = Self::check(response, "file upload").await?;
        let body: UploadedFile = response.json().await?;
        Ok(body.web_view_link)
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        Err(MigrateError::Drive(format!(
            "{} failed with {}: {}",
            what, status, detail
        )))
    }
}

#[async_trait]
impl FileStore for DriveClient {
    async fn find_existing(&self, filename: &str) -> Result<Option<String>> {
        let found = self
            .retry
            .run("drive search", || self.search(filename))
            .await?;
        if found.is_some() {
            debug!(filename, "File already present in destination folder");
        }
        Ok(found)
    }

    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<String> {
        self.retry
            .run("drive upload", || self.do_upload(filename, bytes.clone()))
            .await
    }
}

/// Builds an independent [`DriveClient`] per worker-pool slot, each with
/// its own connection pool.
pub struct DriveClientFactory {
    config: TargetConfig,
    retry: RetryPolicy,
}

impl DriveClientFactory {
    pub fn new(config: TargetConfig, retry: RetryPolicy) -> Self {
        Self { config, retry }
    }
}

impl FileStoreFactory for DriveClientFactory {
    fn create(&self) -> Arc<dyn FileStore> {
        Arc::new(DriveClient::new(&self.config, self.retry))
    }
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FoundFile>,
}

#[derive(Debug, Deserialize)]
struct FoundFile {
    #[serde(rename = "webViewLink")]
    web_view_link: String,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    #[serde(rename = "webViewLink")]
    web_view_link: String,
}
