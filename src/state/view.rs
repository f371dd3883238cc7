use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::core::task::Task;

/// What the task list is narrowed to. Account and tag selectors exclude
/// each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    All,
    Account(String),
    Tag(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOption {
    /// Insertion order. The only order that allows manual reordering.
    #[default]
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "alphabetical")]
    Alphabetical,
    #[serde(rename = "dueDate")]
    DueDate,
    #[serde(rename = "priority")]
    Priority,
}

impl SortOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Alphabetical => "alphabetical",
            Self::DueDate => "dueDate",
            Self::Priority => "priority",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "manual" => Some(Self::Default),
            "alphabetical" | "title" => Some(Self::Alphabetical),
            "duedate" | "due-date" | "due" => Some(Self::DueDate),
            "priority" => Some(Self::Priority),
            _ => None,
        }
    }
}

/// The four independent predicates of the list view, joined with AND.
#[derive(Debug, Clone, Copy)]
pub struct TaskFilter<'a> {
    pub selection: &'a Selection,
    pub search: &'a str,
    pub show_completed: bool,
}

impl TaskFilter<'_> {
    pub fn matches(&self, task: &Task) -> bool {
        let account_ok = match self.selection {
            Selection::Account(id) => task.account_id == *id,
            _ => true,
        };
        let tag_ok = match self.selection {
            Selection::Tag(id) => task.has_tag(id),
            _ => true,
        };
        let search_ok = self.search.is_empty()
            || task
                .title
                .to_lowercase()
                .contains(&self.search.to_lowercase());
        let completion_ok = self.show_completed || !task.completed;
        account_ok && tag_ok && search_ok && completion_ok
    }
}

/// Order tasks for display. All orders are stable with respect to the
/// incoming order.
pub fn sort_tasks<'a>(mut tasks: Vec<&'a Task>, option: SortOption) -> Vec<&'a Task> {
    match option {
        SortOption::Default => {}
        SortOption::Alphabetical => {
            tasks.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
        }
        SortOption::DueDate => tasks.sort_by(|a, b| compare_due(a, b)),
        SortOption::Priority => tasks.sort_by(|a, b| b.priority.rank().cmp(&a.priority.rank())),
    }
    tasks
}

fn compare_due(a: &Task, b: &Task) -> Ordering {
    match (a.due, b.due) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => x.cmp(&y),
    }
}
