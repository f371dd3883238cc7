use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("taskmerge")
}

/// Default location of the config file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("taskmerge")
        .join("config.json")
}

/// OAuth client and endpoint settings for the Google services.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub client_id: String,
    /// Installed-app clients may carry a secret; web-style PKCE clients don't.
    pub client_secret: Option<String>,
    pub auth_uri: String,
    pub token_uri: String,
    pub userinfo_uri: String,
    pub tasks_api_base: String,
    pub drive_api_base: String,
    pub drive_upload_base: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            auth_uri: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            token_uri: "https://oauth2.googleapis.com/token".into(),
            userinfo_uri: "https://www.googleapis.com/oauth2/v3/userinfo".into(),
            tasks_api_base: "https://tasks.googleapis.com/tasks/v1".into(),
            drive_api_base: "https://www.googleapis.com/drive/v3".into(),
            drive_upload_base: "https://www.googleapis.com/upload/drive/v3".into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct AiConfig {
    pub model: String,
    pub endpoint: String,
    pub max_tokens: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: "claude-haiku-4-5-20251001".into(),
            endpoint: "https://api.anthropic.com/v1/messages".into(),
            max_tokens: 1024,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct TaskMergeConfig {
    pub data_directory: PathBuf,
    pub google: GoogleConfig,
    pub ai: AiConfig,
    pub debug_logging: bool,
}

impl Default for TaskMergeConfig {
    fn default() -> Self {
        Self {
            data_directory: default_data_dir(),
            google: GoogleConfig::default(),
            ai: AiConfig::default(),
            debug_logging: false,
        }
    }
}

impl TaskMergeConfig {
    /// Read the config file. A missing file yields the defaults; fields
    /// absent from the file keep their default values.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(format!("Failed to read {}: {}", path.display(), e)),
        };
        serde_json::from_str(&content).map_err(|e| format!("Invalid config {}: {}", path.display(), e))
    }

    /// Ensure the data directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_directory)
    }
}
