use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::account::Account;
use super::tag::Tag;
use super::task::Task;

pub const EXPORT_VERSION: u32 = 1;

/// Accounts, tasks and tags at a point in time; the cloud backup payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    pub accounts: Vec<Account>,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub last_updated: i64,
}

impl AppData {
    pub fn new(accounts: Vec<Account>, tasks: Vec<Task>, tags: Vec<Tag>) -> Self {
        Self {
            accounts,
            tasks,
            tags,
            last_updated: Utc::now().timestamp_millis(),
        }
    }
}

/// The user-facing export document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportFile {
    pub accounts: Vec<Account>,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    EXPORT_VERSION
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Invalid backup file format.")]
    InvalidFormat,
    #[error("Failed to parse backup file.")]
    Parse(#[from] serde_json::Error),
}

impl ExportFile {
    pub fn new(accounts: Vec<Account>, tasks: Vec<Task>, tags: Vec<Tag>) -> Self {
        Self {
            accounts,
            tasks,
            tags,
            version: EXPORT_VERSION,
        }
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse an export document. `accounts` and `tasks` must be present at
    /// the top level; `tags` may be missing.
    pub fn parse(text: &str) -> Result<Self, SnapshotError> {
        let value: serde_json::Value = from_json(text)?;
        let has_required = value.get("accounts").is_some_and(|v| !v.is_null())
            && value.get("tasks").is_some_and(|v| !v.is_null());
        if !has_required {
            return Err(SnapshotError::InvalidFormat);
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Parse JSON without serde_json's nesting limit. Every level of a task
/// tree costs two levels of JSON nesting, and trees have no depth bound.
pub fn from_json<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    let mut de = serde_json::Deserializer::from_str(text);
    de.disable_recursion_limit();
    let value = T::deserialize(serde_stacker::Deserializer::new(&mut de))?;
    de.end()?;
    Ok(value)
}

/// Default file name for an export written on `day`.
pub fn export_file_name(day: NaiveDate) -> String {
    format!("taskmerge-backup-{}.json", day.format("%Y-%m-%d"))
}
