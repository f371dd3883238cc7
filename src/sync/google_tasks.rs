use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{SyncError, check_response};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteTaskList {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

/// One record of a Google Tasks listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteTask {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub due: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// The remote task service.
#[async_trait]
pub trait TaskRemote: Send + Sync {
    async fn list_task_lists(&self, token: &str) -> Result<Vec<RemoteTaskList>, SyncError>;
    async fn list_tasks(&self, token: &str, list_id: &str) -> Result<Vec<RemoteTask>, SyncError>;
    async fn set_status(&self, token: &str, list_id: &str, task_id: &str, completed: bool) -> Result<(), SyncError>;
}

pub fn status_value(completed: bool) -> &'static str {
    if completed { "completed" } else { "needsAction" }
}

/// Google Tasks REST API v1.
pub struct GoogleTasksClient {
    http: reqwest::Client,
    base: String,
}

impl GoogleTasksClient {
    pub fn new(base: &str) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TaskRemote for GoogleTasksClient {
    async fn list_task_lists(&self, token: &str) -> Result<Vec<RemoteTaskList>, SyncError> {
        let resp = self
            .http
            .get(format!("{}/users/@me/lists", self.base))
            .bearer_auth(token)
            .send()
            .await?;
        let resp = check_response(resp, "Failed to fetch task lists").await?;
        let body: ListResponse<RemoteTaskList> = resp.json().await?;
        Ok(body.items)
    }

    async fn list_tasks(&self, token: &str, list_id: &str) -> Result<Vec<RemoteTask>, SyncError> {
        let mut all = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(format!("{}/lists/{}/tasks", self.base, list_id))
                .bearer_auth(token)
                .query(&[("showCompleted", "true"), ("showHidden", "false"), ("maxResults", "100")]);
            if let Some(ref pt) = page_token {
                request = request.query(&[("pageToken", pt.as_str())]);
            }

            let resp = check_response(request.send().await?, "Failed to fetch tasks").await?;
            let body: ListResponse<RemoteTask> = resp.json().await?;
            all.extend(body.items);

            page_token = body.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        log::debug!("Listed {} tasks from {}", all.len(), list_id);
        Ok(all)
    }

    async fn set_status(&self, token: &str, list_id: &str, task_id: &str, completed: bool) -> Result<(), SyncError> {
        let resp = self
            .http
            .patch(format!("{}/lists/{}/tasks/{}", self.base, list_id, task_id))
            .bearer_auth(token)
            .json(&serde_json::json!({ "status": status_value(completed) }))
            .send()
            .await?;
        check_response(resp, "Failed to update task").await?;
        Ok(())
    }
}
