use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }

    /// Case-insensitive parse of "Low", "Medium" or "High".
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    /// Higher is more urgent.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }
}

/// A to-do item. Subtasks are tasks of the same shape, nested to any depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub account_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub completed: bool,
    #[serde(
        rename = "dueDate",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_due"
    )]
    pub due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sub_tasks: Vec<Task>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_task_list_id: Option<String>,
    /// Remote id of the parent task, when the remote record is a subtask.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_parent_id: Option<String>,
}

impl Task {
    pub fn new(account_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: format!("task_{}", Uuid::new_v4().simple()),
            account_id: account_id.into(),
            title: title.into(),
            description: None,
            priority: Priority::Medium,
            completed: false,
            due: None,
            sub_tasks: Vec::new(),
            tags: Vec::new(),
            google_task_id: None,
            google_task_list_id: None,
            google_parent_id: None,
        }
    }

    /// A local child of `parent`, inheriting its account.
    pub fn child_of(parent: &Task, title: impl Into<String>) -> Self {
        let mut task = Self::new(parent.account_id.clone(), title);
        task.id = format!("{}_sub_{}", parent.id, Uuid::new_v4().simple());
        task
    }

    /// True when the task mirrors a Google Tasks record.
    pub fn is_linked(&self) -> bool {
        self.google_task_id.is_some() && self.google_task_list_id.is_some()
    }

    pub fn has_tag(&self, tag_id: &str) -> bool {
        self.tags.iter().any(|t| t == tag_id)
    }

    /// Whether the due instant falls on `day` in local time.
    pub fn is_due_on(&self, day: NaiveDate) -> bool {
        self.due
            .is_some_and(|due| due.with_timezone(&Local).date_naive() == day)
    }

    pub fn completed_subtasks(&self) -> usize {
        self.sub_tasks.iter().filter(|t| t.completed).count()
    }
}

/// A task extracted from free-form text by the AI service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTask {
    pub title: String,
    /// Account name the model thinks the task belongs to.
    #[serde(default)]
    pub account_name_match: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
}

/// Find a task anywhere in a forest, in pre-order.
pub fn find_task<'a>(tasks: &'a [Task], id: &str) -> Option<&'a Task> {
    let mut stack: Vec<&Task> = tasks.iter().rev().collect();
    while let Some(task) = stack.pop() {
        if task.id == id {
            return Some(task);
        }
        stack.extend(task.sub_tasks.iter().rev());
    }
    None
}

pub fn find_task_mut<'a>(tasks: &'a mut [Task], id: &str) -> Option<&'a mut Task> {
    let mut stack: Vec<&mut Task> = tasks.iter_mut().rev().collect();
    while let Some(task) = stack.pop() {
        if task.id == id {
            return Some(task);
        }
        stack.extend(task.sub_tasks.iter_mut().rev());
    }
    None
}

/// Id of the task whose direct children include `id`.
pub fn find_parent_id(tasks: &[Task], id: &str) -> Option<String> {
    let mut stack: Vec<&Task> = tasks.iter().collect();
    while let Some(task) = stack.pop() {
        if task.sub_tasks.iter().any(|t| t.id == id) {
            return Some(task.id.clone());
        }
        stack.extend(task.sub_tasks.iter());
    }
    None
}

/// Total number of nodes in a forest.
pub fn count_tasks(tasks: &[Task]) -> usize {
    let mut stack: Vec<&Task> = tasks.iter().collect();
    let mut count = 0;
    while let Some(task) = stack.pop() {
        count += 1;
        stack.extend(task.sub_tasks.iter());
    }
    count
}

/// Strip a tag id from every task at every depth.
pub fn remove_tag_everywhere(tasks: &mut [Task], tag_id: &str) {
    let mut stack: Vec<&mut Task> = tasks.iter_mut().collect();
    while let Some(task) = stack.pop() {
        task.tags.retain(|t| t != tag_id);
        stack.extend(task.sub_tasks.iter_mut());
    }
}

/// Parse a due date from RFC 3339, a naive local timestamp, or a bare date.
pub fn parse_due(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return local_to_utc(naive);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(local_to_utc)
}

fn local_to_utc(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn deserialize_due<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_due))
}
