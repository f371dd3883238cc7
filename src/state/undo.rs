use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::task::Task;

/// How long a deleted task stays recoverable.
pub const UNDO_WINDOW_SECS: i64 = 5;

/// A task removed from the list, waiting out its undo window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedTask {
    pub task: Task,
    /// Parent the task was removed from, `None` for a root task.
    #[serde(default)]
    pub parent_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Single-slot undo buffer. Only the most recent deletion is recoverable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UndoBuffer {
    slot: Option<DeletedTask>,
}

impl UndoBuffer {
    /// Hold `task`, replacing whatever was held before.
    pub fn push(&mut self, task: Task, parent_id: Option<String>, now: DateTime<Utc>) {
        self.slot = Some(DeletedTask {
            task,
            parent_id,
            expires_at: now + Duration::seconds(UNDO_WINDOW_SECS),
        });
    }

    /// Take the held task if its window is still open. The slot is emptied
    /// either way.
    pub fn take(&mut self, now: DateTime<Utc>) -> Option<DeletedTask> {
        self.slot.take().filter(|d| now < d.expires_at)
    }

    pub fn peek(&self, now: DateTime<Utc>) -> Option<&DeletedTask> {
        self.slot.as_ref().filter(|d| now < d.expires_at)
    }

    /// Drop the held task once its window has closed.
    pub fn expire(&mut self, now: DateTime<Utc>) {
        if self.slot.as_ref().is_some_and(|d| now >= d.expires_at) {
            self.slot = None;
        }
    }

    /// Whole seconds left in the window, for the countdown toast.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        self.peek(now)
            .map(|d| (d.expires_at - now).num_seconds().max(0))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_within_window() {
        let now = Utc::now();
        let mut buf = UndoBuffer::default();
        let task = Task::new("acc", "A");
        buf.push(task.clone(), None, now);
        assert_eq!(buf.remaining_secs(now), UNDO_WINDOW_SECS);
        let held = buf.take(now + Duration::seconds(4)).unwrap();
        assert_eq!(held.task, task);
        assert!(buf.take(now).is_none());
    }

    #[test]
    fn window_closes() {
        let now = Utc::now();
        let mut buf = UndoBuffer::default();
        buf.push(Task::new("acc", "A"), None, now);
        assert!(buf.take(now + Duration::seconds(UNDO_WINDOW_SECS)).is_none());
    }

    #[test]
    fn second_push_overwrites() {
        let now = Utc::now();
        let mut buf = UndoBuffer::default();
        buf.push(Task::new("acc", "first"), None, now);
        buf.push(Task::new("acc", "second"), None, now);
        assert_eq!(buf.take(now).unwrap().task.title, "second");
    }

    #[test]
    fn expire_clears_stale_slot() {
        let now = Utc::now();
        let mut buf = UndoBuffer::default();
        buf.push(Task::new("acc", "A"), None, now);
        buf.expire(now + Duration::seconds(1));
        assert!(buf.peek(now).is_some());
        buf.expire(now + Duration::seconds(10));
        assert_eq!(buf, UndoBuffer::default());
    }
}
