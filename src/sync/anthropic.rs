use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;
use serde::Deserialize;

use crate::config::AiConfig;
use crate::core::account::Account;
use crate::core::task::{ParsedTask, Task};

const KEYRING_KEY: &str = "anthropic-api";

static REVIEW_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(review|analyze)").expect("valid regex"));

/// A task invented for a local list by the sample generator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SampleTask {
    pub title: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubtaskTitle {
    title: String,
}

/// Whether free-form input asks for a review of existing tasks rather than
/// describing new ones.
pub fn is_review_request(input: &str) -> bool {
    if REVIEW_PREFIX_RE.is_match(input) {
        return true;
    }
    let lower = input.to_lowercase();
    (lower.contains("which") || lower.contains("what")) && lower.contains("tasks")
}

/// Anthropic Messages API client.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    api_key: String,
    config: AiConfig,
    http: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, config: AiConfig) -> Self {
        Self {
            api_key: api_key.into(),
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Client using the key stored in the keyring, if any.
    pub async fn from_keyring(config: AiConfig) -> Option<Self> {
        match load_api_key().await {
            Ok(Some(key)) => Some(Self::new(key, config)),
            Ok(None) => None,
            Err(e) => {
                log::warn!("Could not load AI key: {}", e);
                None
            }
        }
    }

    /// Send one user message and return the text of the first content block.
    async fn complete(&self, system: Option<&str>, prompt: &str, max_tokens: u32) -> Result<String, String> {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": max_tokens,
            "messages": [
                { "role": "user", "content": prompt }
            ]
        });
        if let Some(system) = system {
            body["system"] = serde_json::Value::String(system.to_string());
        }

        let resp = self
            .http
            .post(&self.config.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("API request failed: {}", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("API error {}: {}", status, text));
        }

        let api_resp: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| format!("Failed to parse API response: {}", e))?;

        first_text(&api_resp)
            .map(str::to_string)
            .ok_or_else(|| "No text in API response".to_string())
    }

    /// Ask for JSON and decode it, tolerating markdown code fences.
    async fn complete_json<T: serde::de::DeserializeOwned>(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<T, String> {
        let text = self.complete(Some(system), prompt, self.config.max_tokens).await?;
        serde_json::from_str(strip_fences(&text)).map_err(|e| format!("Failed to parse model output: {} (raw: {})", e, text))
    }

    /// Extract tasks from a free-form sentence. Empty on any failure.
    pub async fn parse_tasks_from_input(
        &self,
        input: &str,
        accounts: &[Account],
        now: DateTime<Local>,
    ) -> Vec<ParsedTask> {
        let prompt = parse_prompt(input, accounts, now);
        match self.complete_json::<Vec<ParsedTask>>(JSON_ARRAY_SYSTEM, &prompt).await {
            Ok(tasks) => tasks,
            Err(e) => {
                log::error!("Task extraction failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Answer a question about the given tasks in plain text.
    pub async fn analyze_task_list(&self, tasks: &[Task], query: &str) -> String {
        let prompt = format!(
            "You are a helpful productivity assistant.\n\
             Here is the user's current task list:\n\n{}\n\n\
             The user asks: \"{}\"\n\n\
             Provide a helpful, concise response based strictly on the tasks listed above. \
             If the user asks to identify specific tasks (e.g., \"which ones are urgent\"), list them bulleted. \
             Keep the tone professional and encouraging.",
            task_context(tasks),
            query
        );
        match self.complete(None, &prompt, self.config.max_tokens).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => "I couldn't analyze your tasks at the moment.".to_string(),
            Err(e) => {
                log::error!("Task analysis failed: {}", e);
                "Sorry, I encountered an error while analyzing your tasks.".to_string()
            }
        }
    }

    /// Suggest 3-5 subtask titles. Empty on any failure.
    pub async fn break_down_task(&self, title: &str) -> Vec<String> {
        let prompt = format!(
            "Break down the task \"{}\" into 3-5 actionable subtasks. \
             Each element is an object with a \"title\" string.",
            title
        );
        match self.complete_json::<Vec<SubtaskTitle>>(JSON_ARRAY_SYSTEM, &prompt).await {
            Ok(items) => items.into_iter().map(|s| s.title).collect(),
            Err(e) => {
                log::error!("Task breakdown failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Invent a few realistic tasks for a local list. Empty on any failure.
    pub async fn generate_sample_tasks(&self, account_name: &str) -> Vec<SampleTask> {
        let prompt = format!(
            "Generate 3 realistic, professional tasks for a user's \"{}\" account. Mix of priorities. \
             Each element has \"title\", \"priority\" (\"Low\", \"Medium\" or \"High\") \
             and an optional \"description\".",
            account_name
        );
        match self.complete_json::<Vec<SampleTask>>(JSON_ARRAY_SYSTEM, &prompt).await {
            Ok(tasks) => tasks,
            Err(e) => {
                log::warn!("Sample task generation failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Verify the API key with a minimal request.
    pub async fn test_api_key(&self) -> Result<String, String> {
        match self.complete(None, "Reply with OK", 4).await {
            Ok(_) => Ok("API key valid".to_string()),
            Err(e) if e.starts_with("API error 401") => Err("Invalid API key".to_string()),
            Err(e) => Err(e),
        }
    }
}

const JSON_ARRAY_SYSTEM: &str = "You are an intelligent task manager assistant. \
     Return ONLY a JSON array, no explanation.";

fn parse_prompt(input: &str, accounts: &[Account], now: DateTime<Local>) -> String {
    let names: Vec<&str> = accounts.iter().map(|a| a.name.as_str()).collect();
    format!(
        "The user has the following accounts connected: [{}].\n\
         The current date and time is: {}.\n\n\
         Analyze the user's request: \"{}\".\n\n\
         Extract distinct tasks. For each task:\n\
         1. \"accountNameMatch\": the most relevant account from the list. If unclear, the first one.\n\
         2. \"priority\": \"Low\", \"Medium\" or \"High\".\n\
         3. \"title\": a concise title.\n\
         4. \"description\": a brief description if details are available, else omit.\n\
         5. \"dueDate\": any due date or time mentioned as YYYY-MM-DDTHH:mm:ss, else null.\n",
        names.join(", "),
        now.format("%A %Y-%m-%d %H:%M:%S %:z"),
        input
    )
}

/// One line per task: priority, title, status and due date.
fn task_context(tasks: &[Task]) -> String {
    tasks
        .iter()
        .map(|t| {
            format!(
                "- [{}] \"{}\" (Status: {}, Due: {})",
                t.priority.as_str(),
                t.title,
                if t.completed { "Completed" } else { "Pending" },
                t.due
                    .map(|d| d.with_timezone(&Local).format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "None".to_string())
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn first_text(api_resp: &serde_json::Value) -> Option<&str> {
    api_resp["content"]
        .as_array()
        .and_then(|arr| arr.first())
        .and_then(|block| block["text"].as_str())
}

/// Strip markdown code fences if present.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Store the Anthropic API key in the system keyring.
pub async fn store_api_key(key: &str) -> Result<(), String> {
    super::keyring::store_secret(KEYRING_KEY, "TaskMerge Anthropic API Key", key).await
}

/// Load the Anthropic API key from the system keyring.
pub async fn load_api_key() -> Result<Option<String>, String> {
    super::keyring::load_secret(KEYRING_KEY).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::Priority;

    #[test]
    fn detects_review_requests() {
        assert!(is_review_request("Review my tasks"));
        assert!(is_review_request("  analyze my week"));
        assert!(is_review_request("Which tasks are overdue?"));
        assert!(is_review_request("what tasks can wait"));
        assert!(!is_review_request("Buy milk tomorrow"));
        assert!(!is_review_request("which shop sells bread"));
    }

    #[test]
    fn strips_code_fences() {
        assert_eq!(strip_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_fences("```\n[]\n```"), "[]");
        assert_eq!(strip_fences("  [2] "), "[2]");
    }

    #[test]
    fn reads_first_text_block() {
        let resp = serde_json::json!({"content": [{"type": "text", "text": "hello"}]});
        assert_eq!(first_text(&resp), Some("hello"));
        assert_eq!(first_text(&serde_json::json!({"content": []})), None);
    }

    #[test]
    fn parsed_task_json_shape() {
        let raw = r#"[{"title": "Email Bob", "accountNameMatch": "Work", "priority": "High",
                       "dueDate": "2024-05-01T09:00:00"}]"#;
        let tasks: Vec<ParsedTask> = serde_json::from_str(strip_fences(raw)).unwrap();
        assert_eq!(tasks[0].account_name_match, "Work");
        assert_eq!(tasks[0].due_date.as_deref(), Some("2024-05-01T09:00:00"));
        assert_eq!(tasks[0].description, None);
    }

    #[test]
    fn context_lists_status_and_due() {
        let mut done = Task::new("acc", "File taxes");
        done.completed = true;
        done.priority = Priority::High;
        let open = Task::new("acc", "Walk dog");
        let ctx = task_context(&[done, open]);
        assert!(ctx.contains("- [High] \"File taxes\" (Status: Completed, Due: None)"));
        assert!(ctx.contains("- [Medium] \"Walk dog\" (Status: Pending"));
    }

    #[test]
    fn prompt_names_accounts() {
        let accounts = vec![Account::local("Home", "blue"), Account::local("Work", "green")];
        let prompt = parse_prompt("call mom", &accounts, Local::now());
        assert!(prompt.contains("[Home, Work]"));
        assert!(prompt.contains("\"call mom\""));
    }
}
