use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{SyncError, check_response};
use crate::core::snapshot::{self, AppData};

pub const BACKUP_FILE_NAME: &str = "taskmerge_data.json";
const BOUNDARY: &str = "-------314159265358979323846";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    Created,
    Updated,
}

/// The remote file store holding the single backup document.
#[async_trait]
pub trait BackupRemote: Send + Sync {
    /// Id of the backup file, if one exists.
    async fn find_backup(&self, token: &str) -> Result<Option<String>, SyncError>;
    async fn create_backup(&self, token: &str, content: &str) -> Result<(), SyncError>;
    async fn update_backup(&self, token: &str, file_id: &str, content: &str) -> Result<(), SyncError>;
    async fn download_backup(&self, token: &str, file_id: &str) -> Result<String, SyncError>;
}

/// Write `data`, updating the existing backup file or creating one.
pub async fn save_app_data(remote: &dyn BackupRemote, token: &str, data: &AppData) -> Result<BackupOutcome, SyncError> {
    let content = serde_json::to_string(data)?;
    match remote.find_backup(token).await? {
        Some(file_id) => {
            remote.update_backup(token, &file_id, &content).await?;
            Ok(BackupOutcome::Updated)
        }
        None => {
            remote.create_backup(token, &content).await?;
            Ok(BackupOutcome::Created)
        }
    }
}

/// Read the backup. `None` when no backup file exists.
pub async fn load_app_data(remote: &dyn BackupRemote, token: &str) -> Result<Option<AppData>, SyncError> {
    let Some(file_id) = remote.find_backup(token).await? else {
        return Ok(None);
    };
    let content = remote.download_backup(token, &file_id).await?;
    Ok(Some(snapshot::from_json(&content)?))
}

pub fn search_query() -> String {
    format!("name='{}' and 'appDataFolder' in parents", BACKUP_FILE_NAME)
}

/// `multipart/related` upload body: JSON metadata, then the JSON payload.
pub fn multipart_body(content: &str) -> String {
    let metadata = serde_json::json!({
        "name": BACKUP_FILE_NAME,
        "parents": ["appDataFolder"],
    });
    let delimiter = format!("\r\n--{}\r\n", BOUNDARY);
    let close_delim = format!("\r\n--{}--", BOUNDARY);
    format!(
        "{d}Content-Type: application/json\r\n\r\n{meta}{d}Content-Type: application/json\r\n\r\n{content}{close}",
        d = delimiter,
        meta = metadata,
        content = content,
        close = close_delim
    )
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    id: String,
}

/// Google Drive v3, app-data folder only.
pub struct DriveClient {
    http: reqwest::Client,
    api_base: String,
    upload_base: String,
}

impl DriveClient {
    pub fn new(api_base: &str, upload_base: &str) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            upload_base: upload_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl BackupRemote for DriveClient {
    async fn find_backup(&self, token: &str) -> Result<Option<String>, SyncError> {
        let resp = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[("q", search_query().as_str()), ("spaces", "appDataFolder")])
            .send()
            .await?;
        let resp = check_response(resp, "Failed to search Drive").await?;
        let list: FileList = resp.json().await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create_backup(&self, token: &str, content: &str) -> Result<(), SyncError> {
        let resp = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(token)
            .query(&[("uploadType", "multipart")])
            .header("content-type", format!("multipart/related; boundary={}", BOUNDARY))
            .body(multipart_body(content))
            .send()
            .await?;
        check_response(resp, "Failed to create Drive file").await?;
        Ok(())
    }

    async fn update_backup(&self, token: &str, file_id: &str, content: &str) -> Result<(), SyncError> {
        let resp = self
            .http
            .patch(format!("{}/files/{}", self.upload_base, file_id))
            .bearer_auth(token)
            .query(&[("uploadType", "media")])
            .header("content-type", "application/json")
            .body(content.to_string())
            .send()
            .await?;
        check_response(resp, "Failed to update Drive file").await?;
        Ok(())
    }

    async fn download_backup(&self, token: &str, file_id: &str) -> Result<String, SyncError> {
        let resp = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(token)
            .query(&[("alt", "media")])
            .send()
            .await?;
        let resp = check_response(resp, "Failed to download Drive file").await?;
        Ok(resp.text().await?)
    }
}
