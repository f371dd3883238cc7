//! The application state container.
//!
//! `AppState` exclusively owns accounts, tasks and tags. Everything else reads
//! through the accessors and changes state through the reducer-style methods
//! below, so every rule (primary account protection, tag cascade, undo
//! window) lives in one place.

pub mod undo;
pub mod view;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::account::{self, Account, User};
use crate::core::tag::{self, Tag};
use crate::core::task::{self, ParsedTask, Priority, Task};
use undo::{DeletedTask, UndoBuffer};
use view::{Selection, SortOption, TaskFilter};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("This account is already connected.")]
    AccountExists,
    #[error("Cannot delete the primary account.")]
    PrimaryAccount,
    #[error("Unknown account: {0}")]
    UnknownAccount(String),
    #[error("Unknown task: {0}")]
    UnknownTask(String),
    #[error("Unknown tag: {0}")]
    UnknownTag(String),
    #[error("Manual reordering requires the default sort order")]
    ReorderLocked,
    #[error("Add an account first")]
    NoAccounts,
    #[error("Name must not be empty")]
    EmptyName,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// UI preferences persisted next to the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub theme: Theme,
    pub sort: SortOption,
    pub show_completed: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            sort: SortOption::Default,
            show_completed: true,
        }
    }
}

/// Outcome of merging a remote import into the local list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub added: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Default)]
pub struct AppState {
    user: Option<User>,
    accounts: Vec<Account>,
    tasks: Vec<Task>,
    tags: Vec<Tag>,
    prefs: Preferences,
    selection: Selection,
    search: String,
    undo: UndoBuffer,
}

impl AppState {
    pub fn new(
        user: Option<User>,
        accounts: Vec<Account>,
        tasks: Vec<Task>,
        tags: Vec<Tag>,
        prefs: Preferences,
        undo: UndoBuffer,
    ) -> Self {
        Self {
            user,
            accounts,
            tasks,
            tags,
            prefs,
            selection: Selection::All,
            search: String::new(),
            undo,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn prefs(&self) -> Preferences {
        self.prefs
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn undo_buffer(&self) -> &UndoBuffer {
        &self.undo
    }

    pub fn account(&self, id: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }

    /// Look an account up by id, then by case-insensitive name.
    pub fn resolve_account(&self, key: &str) -> Option<&Account> {
        self.account(key).or_else(|| {
            let key = key.to_lowercase();
            self.accounts.iter().find(|a| a.name.to_lowercase() == key)
        })
    }

    pub fn resolve_tag(&self, key: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.id == key).or_else(|| {
            let key = key.to_lowercase();
            self.tags.iter().find(|t| t.name.to_lowercase() == key)
        })
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        task::find_task(&self.tasks, id)
    }

    /// The signed-in Google account, if any.
    pub fn primary_account(&self) -> Option<&Account> {
        self.accounts.iter().find(|a| a.is_primary && a.is_google())
    }

    /// Email to hint when authorizing `account`: the signed-in identity for
    /// the primary account, the stored email otherwise.
    pub fn login_hint(&self, account: &Account) -> String {
        match (&self.user, account.is_primary) {
            (Some(user), true) => user.email.clone(),
            _ => account.email.clone(),
        }
    }

    pub fn next_account_color(&self) -> &'static str {
        account::color_for(self.accounts.len())
    }

    // ---- session ----

    /// Record a sign-in. An existing Google account with the same email is
    /// promoted to primary; otherwise a new primary account is prepended.
    /// Returns the primary account id.
    pub fn sign_in(&mut self, user: User) -> String {
        let email = user.email.to_lowercase();
        let existing = self
            .accounts
            .iter()
            .position(|a| a.is_google() && a.email.to_lowercase() == email);

        for acc in &mut self.accounts {
            acc.is_primary = false;
        }

        let id = match existing {
            Some(idx) => {
                let acc = &mut self.accounts[idx];
                acc.is_primary = true;
                acc.rename(user.name.clone());
                acc.id.clone()
            }
            None => {
                let mut acc = Account::google(&user, "indigo");
                acc.is_primary = true;
                let id = acc.id.clone();
                self.accounts.insert(0, acc);
                id
            }
        };

        log::info!("Signed in as {}", user.email);
        self.user = Some(user);
        id
    }

    pub fn sign_out(&mut self) {
        self.user = None;
    }

    // ---- accounts ----

    /// Connect a new account together with the tasks imported for it.
    pub fn add_account(&mut self, account: Account, imported: Vec<Task>) -> Result<(), StateError> {
        let duplicate = account.is_google()
            && self
                .accounts
                .iter()
                .any(|a| a.provider == account.provider && a.email == account.email);
        if duplicate {
            return Err(StateError::AccountExists);
        }

        let id = account.id.clone();
        self.accounts.push(account);
        for task in imported {
            if task::find_task(&self.tasks, &task.id).is_none() {
                self.tasks.push(task);
            }
        }
        self.select_account(&id);
        Ok(())
    }

    pub fn rename_account(&mut self, id: &str, name: &str) -> Result<(), StateError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StateError::EmptyName);
        }
        self.account_mut(id)?.rename(name);
        Ok(())
    }

    pub fn recolor_account(&mut self, id: &str, color: &str) -> Result<(), StateError> {
        self.account_mut(id)?.color = color.to_string();
        Ok(())
    }

    /// Turn a Google account into a local list. Returns false (and changes
    /// nothing) for the primary account.
    pub fn unlink_account(&mut self, id: &str) -> Result<bool, StateError> {
        let acc = self.account_mut(id)?;
        if acc.is_primary {
            return Ok(false);
        }
        acc.provider = account::Provider::Local;
        Ok(true)
    }

    /// Remove an account and every task it owns, returning the account.
    pub fn delete_account(&mut self, id: &str) -> Result<Account, StateError> {
        let pos = self
            .accounts
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| StateError::UnknownAccount(id.into()))?;
        if self.accounts[pos].is_primary {
            return Err(StateError::PrimaryAccount);
        }
        let removed = self.accounts.remove(pos);
        self.tasks.retain(|t| t.account_id != id);
        if self.selection == Selection::Account(id.to_string()) {
            self.select_all();
        }
        Ok(removed)
    }

    fn account_mut(&mut self, id: &str) -> Result<&mut Account, StateError> {
        self.accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StateError::UnknownAccount(id.into()))
    }

    // ---- tasks ----

    /// Turn AI-parsed tasks into real tasks, prepended to the list.
    /// Returns the new ids.
    pub fn add_parsed_tasks(&mut self, parsed: Vec<ParsedTask>) -> Result<Vec<String>, StateError> {
        let fallback = self.accounts.first().ok_or(StateError::NoAccounts)?.id.clone();

        let new_tasks: Vec<Task> = parsed
            .into_iter()
            .map(|pt| {
                let wanted = pt.account_name_match.to_lowercase();
                let account_id = self
                    .accounts
                    .iter()
                    .find(|a| a.name.to_lowercase().contains(&wanted))
                    .map(|a| a.id.clone())
                    .unwrap_or_else(|| fallback.clone());
                let mut task = Task::new(account_id, pt.title);
                task.description = pt.description.filter(|d| !d.trim().is_empty());
                task.priority = Priority::from_label(&pt.priority).unwrap_or_default();
                task.due = pt.due_date.as_deref().and_then(task::parse_due);
                task
            })
            .collect();

        let ids = new_tasks.iter().map(|t| t.id.clone()).collect();
        let mut tasks = new_tasks;
        tasks.append(&mut self.tasks);
        self.tasks = tasks;
        Ok(ids)
    }

    /// Manually add a task to the end of the list.
    pub fn add_task(
        &mut self,
        account_id: &str,
        title: &str,
        priority: Priority,
        due: Option<DateTime<Utc>>,
    ) -> Result<String, StateError> {
        if self.account(account_id).is_none() {
            return Err(StateError::UnknownAccount(account_id.into()));
        }
        let title = title.trim();
        if title.is_empty() {
            return Err(StateError::EmptyName);
        }
        let mut task = Task::new(account_id, title);
        task.priority = priority;
        task.due = due;
        let id = task.id.clone();
        self.tasks.push(task);
        Ok(id)
    }

    /// Append tasks as-is, skipping ids that already exist.
    pub fn append_tasks(&mut self, tasks: Vec<Task>) -> usize {
        let mut added = 0;
        for t in tasks {
            if task::find_task(&self.tasks, &t.id).is_none() {
                self.tasks.push(t);
                added += 1;
            }
        }
        added
    }

    /// Merge a fresh remote import. Existing tasks keep their local priority
    /// and tags; everything the remote owns is overwritten.
    pub fn merge_remote_tasks(&mut self, fetched: Vec<Task>) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for remote in fetched {
            match self.tasks.iter_mut().find(|t| t.id == remote.id) {
                Some(local) => {
                    local.title = remote.title;
                    local.description = remote.description;
                    local.completed = remote.completed;
                    local.due = remote.due;
                    local.google_task_id = remote.google_task_id;
                    local.google_task_list_id = remote.google_task_list_id;
                    local.sub_tasks = remote.sub_tasks;
                    summary.updated += 1;
                }
                None => {
                    self.tasks.push(remote);
                    summary.added += 1;
                }
            }
        }
        summary
    }

    /// Flip a task's completion flag. Returns the new value.
    pub fn toggle_completed(&mut self, id: &str) -> Result<bool, StateError> {
        let task = self.task_mut(id)?;
        task.completed = !task.completed;
        Ok(task.completed)
    }

    pub fn set_completed(&mut self, id: &str, completed: bool) -> Result<(), StateError> {
        self.task_mut(id)?.completed = completed;
        Ok(())
    }

    pub fn update_task(&mut self, id: &str, title: &str, description: Option<String>) -> Result<(), StateError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StateError::EmptyName);
        }
        let task = self.task_mut(id)?;
        task.title = title.to_string();
        task.description = description.filter(|d| !d.trim().is_empty());
        Ok(())
    }

    pub fn set_priority(&mut self, id: &str, priority: Priority) -> Result<(), StateError> {
        self.task_mut(id)?.priority = priority;
        Ok(())
    }

    pub fn set_due(&mut self, id: &str, due: Option<DateTime<Utc>>) -> Result<(), StateError> {
        self.task_mut(id)?.due = due;
        Ok(())
    }

    pub fn set_subtasks(&mut self, id: &str, children: Vec<Task>) -> Result<(), StateError> {
        self.task_mut(id)?.sub_tasks = children;
        Ok(())
    }

    /// Replace a task's children with new local subtasks, one per title.
    pub fn apply_breakdown(&mut self, id: &str, titles: Vec<String>) -> Result<usize, StateError> {
        let parent = self.task_mut(id)?;
        let children: Vec<Task> = titles
            .into_iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| Task::child_of(parent, t.trim()))
            .collect();
        let count = children.len();
        parent.sub_tasks = children;
        Ok(count)
    }

    /// Move a root task to the position of another. Only allowed in
    /// insertion order.
    pub fn move_task(&mut self, source: &str, target: &str) -> Result<(), StateError> {
        if self.prefs.sort != SortOption::Default {
            return Err(StateError::ReorderLocked);
        }
        move_within(&mut self.tasks, source, target)
    }

    /// Reorder two siblings under `parent_id`, at any depth.
    pub fn reorder_subtasks(&mut self, parent_id: &str, source: &str, target: &str) -> Result<(), StateError> {
        let parent = self.task_mut(parent_id)?;
        move_within(&mut parent.sub_tasks, source, target)
    }

    fn task_mut(&mut self, id: &str) -> Result<&mut Task, StateError> {
        task::find_task_mut(&mut self.tasks, id).ok_or_else(|| StateError::UnknownTask(id.into()))
    }

    // ---- delete / undo ----

    /// Remove a task (at any depth) into the undo buffer. A previous
    /// deletion still in its window becomes unrecoverable.
    pub fn delete_task(&mut self, id: &str, now: DateTime<Utc>) -> Result<(), StateError> {
        let (task, parent_id) =
            remove_from(&mut self.tasks, id).ok_or_else(|| StateError::UnknownTask(id.into()))?;
        log::debug!("Deleted '{}' (undo window open)", task.title);
        self.undo.push(task, parent_id, now);
        Ok(())
    }

    /// Restore the most recent deletion if its window is open. The task goes
    /// to the end of the list it came from (or of the root list when that
    /// parent is gone). Returns the restored task id.
    pub fn undo_delete(&mut self, now: DateTime<Utc>) -> Option<String> {
        let DeletedTask { task, parent_id, .. } = self.undo.take(now)?;
        if task::find_task(&self.tasks, &task.id).is_some() {
            return None;
        }
        let id = task.id.clone();
        let parent = parent_id
            .as_deref()
            .and_then(|p| task::find_task_mut(&mut self.tasks, p));
        match parent {
            Some(parent) => parent.sub_tasks.push(task),
            None => self.tasks.push(task),
        }
        Some(id)
    }

    pub fn expire_undo(&mut self, now: DateTime<Utc>) {
        self.undo.expire(now);
    }

    // ---- tags ----

    pub fn add_tag(&mut self, name: &str) -> Result<String, StateError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StateError::EmptyName);
        }
        let color = tag::TAG_COLORS[self.tags.len() % tag::TAG_COLORS.len()];
        let tag = Tag::new(name, color);
        let id = tag.id.clone();
        self.tags.push(tag);
        Ok(id)
    }

    /// Delete a tag, strip it from every task, and reset the tag filter if
    /// it pointed at it.
    pub fn delete_tag(&mut self, id: &str) -> Result<(), StateError> {
        if !self.tags.iter().any(|t| t.id == id) {
            return Err(StateError::UnknownTag(id.into()));
        }
        self.tags.retain(|t| t.id != id);
        task::remove_tag_everywhere(&mut self.tasks, id);
        if self.selection == Selection::Tag(id.to_string()) {
            self.select_all();
        }
        Ok(())
    }

    /// Add or remove a tag on a task. Returns whether the task now has it.
    pub fn toggle_task_tag(&mut self, task_id: &str, tag_id: &str) -> Result<bool, StateError> {
        if !self.tags.iter().any(|t| t.id == tag_id) {
            return Err(StateError::UnknownTag(tag_id.into()));
        }
        let task = self.task_mut(task_id)?;
        if task.has_tag(tag_id) {
            task.tags.retain(|t| t != tag_id);
            Ok(false)
        } else {
            task.tags.push(tag_id.to_string());
            Ok(true)
        }
    }

    // ---- selection and preferences ----

    pub fn select_account(&mut self, id: &str) {
        self.selection = Selection::Account(id.to_string());
    }

    pub fn select_tag(&mut self, id: &str) {
        self.selection = Selection::Tag(id.to_string());
    }

    pub fn select_all(&mut self) {
        self.selection = Selection::All;
    }

    pub fn set_search(&mut self, query: &str) {
        self.search = query.to_string();
    }

    pub fn set_sort(&mut self, sort: SortOption) {
        self.prefs.sort = sort;
    }

    pub fn set_show_completed(&mut self, show: bool) {
        self.prefs.show_completed = show;
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.prefs.theme = theme;
    }

    // ---- derived views ----

    /// Root tasks after filtering and sorting.
    pub fn visible_tasks(&self) -> Vec<&Task> {
        let filter = TaskFilter {
            selection: &self.selection,
            search: &self.search,
            show_completed: self.prefs.show_completed,
        };
        let matching = self.tasks.iter().filter(|t| filter.matches(t)).collect();
        view::sort_tasks(matching, self.prefs.sort)
    }

    /// Visible, incomplete tasks due on `today`.
    pub fn due_today_count(&self, today: NaiveDate) -> usize {
        self.visible_tasks()
            .into_iter()
            .filter(|t| !t.completed && t.is_due_on(today))
            .count()
    }

    /// Tasks an AI review should look at: the selected account's, or all.
    pub fn analysis_context(&self) -> Vec<Task> {
        match &self.selection {
            Selection::Account(id) => self
                .tasks
                .iter()
                .filter(|t| t.account_id == *id)
                .cloned()
                .collect(),
            _ => self.tasks.clone(),
        }
    }

    /// Title for the list header.
    pub fn heading(&self) -> String {
        match &self.selection {
            Selection::All => "All Tasks".to_string(),
            Selection::Account(id) => self
                .account(id)
                .map(|a| a.name.clone())
                .unwrap_or_else(|| "Unknown Account".to_string()),
            Selection::Tag(id) => self
                .tags
                .iter()
                .find(|t| t.id == *id)
                .map(|t| t.name.clone())
                .unwrap_or_else(|| "Unknown Tag".to_string()),
        }
    }

    /// Overwrite all data from an import or restore. Only the first
    /// account flagged primary keeps the flag.
    pub fn replace_data(&mut self, mut accounts: Vec<Account>, tasks: Vec<Task>, tags: Vec<Tag>) {
        let mut seen_primary = false;
        for acc in accounts.iter_mut().filter(|a| a.is_primary) {
            if seen_primary {
                log::warn!("Demoting extra primary account {}", acc.email);
                acc.is_primary = false;
            }
            seen_primary = true;
        }
        log::info!(
            "Replacing local data: {} accounts, {} tasks, {} tags",
            accounts.len(),
            tasks.len(),
            tags.len()
        );
        self.accounts = accounts;
        self.tasks = tasks;
        self.tags = tags;
        self.select_all();
    }
}

/// Detach a task from wherever it sits, with the id of its former parent.
fn remove_from(tasks: &mut Vec<Task>, id: &str) -> Option<(Task, Option<String>)> {
    if let Some(pos) = tasks.iter().position(|t| t.id == id) {
        return Some((tasks.remove(pos), None));
    }
    let parent_id = task::find_parent_id(tasks, id)?;
    let parent = task::find_task_mut(tasks, &parent_id)?;
    let pos = parent.sub_tasks.iter().position(|t| t.id == id)?;
    Some((parent.sub_tasks.remove(pos), Some(parent_id)))
}

fn move_within(list: &mut Vec<Task>, source: &str, target: &str) -> Result<(), StateError> {
    if source == target {
        return Ok(());
    }
    let from = list
        .iter()
        .position(|t| t.id == source)
        .ok_or_else(|| StateError::UnknownTask(source.into()))?;
    let to = list
        .iter()
        .position(|t| t.id == target)
        .ok_or_else(|| StateError::UnknownTask(target.into()))?;
    let moved = list.remove(from);
    list.insert(to, moved);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(email: &str) -> User {
        User {
            name: "Sam Doe".into(),
            email: email.into(),
            picture: String::new(),
            sub: Some("42".into()),
        }
    }

    fn with_local() -> (AppState, String) {
        let mut state = AppState::default();
        let acc = Account::local("Home", "blue");
        let id = acc.id.clone();
        state.add_account(acc, Vec::new()).unwrap();
        (state, id)
    }

    fn ids(tasks: &[&Task]) -> Vec<String> {
        tasks.iter().map(|t| t.title.clone()).collect()
    }

    #[test]
    fn sign_in_creates_primary() {
        let (mut state, local) = with_local();
        let primary = state.sign_in(user("sam@example.com"));
        assert_eq!(state.accounts()[0].id, primary);
        assert!(state.primary_account().is_some());
        assert!(!state.account(&local).unwrap().is_primary);
    }

    #[test]
    fn sign_in_promotes_existing_google_account() {
        let mut state = AppState::default();
        let mut existing = Account::google(&user("Sam@Example.com"), "blue");
        existing.id = "acc_google_old".into();
        state.add_account(existing, Vec::new()).unwrap();

        let primary = state.sign_in(user("sam@example.com"));
        assert_eq!(primary, "acc_google_old");
        assert_eq!(state.accounts().len(), 1);
        assert!(state.accounts()[0].is_primary);
        assert_eq!(state.accounts()[0].initials, "SA");
    }

    #[test]
    fn duplicate_google_account_rejected() {
        let mut state = AppState::default();
        let u = user("a@example.com");
        state.add_account(Account::google(&u, "blue"), Vec::new()).unwrap();
        let err = state.add_account(Account::google(&u, "red"), Vec::new()).unwrap_err();
        assert_eq!(err, StateError::AccountExists);
        // several local lists share the placeholder email
        state.add_account(Account::local("One", "blue"), Vec::new()).unwrap();
        state.add_account(Account::local("Two", "blue"), Vec::new()).unwrap();
        assert_eq!(state.accounts().len(), 3);
    }

    #[test]
    fn primary_account_is_protected() {
        let mut state = AppState::default();
        let primary = state.sign_in(user("sam@example.com"));
        assert_eq!(state.delete_account(&primary), Err(StateError::PrimaryAccount));
        assert_eq!(state.unlink_account(&primary), Ok(false));
        assert!(state.account(&primary).unwrap().is_google());
    }

    #[test]
    fn delete_account_drops_its_tasks_and_selection() {
        let (mut state, local) = with_local();
        state.add_task(&local, "Dishes", Priority::Low, None).unwrap();
        state.select_account(&local);
        state.delete_account(&local).unwrap();
        assert!(state.tasks().is_empty());
        assert_eq!(state.selection(), &Selection::All);
    }

    #[test]
    fn parsed_tasks_route_to_matching_account() {
        let (mut state, home) = with_local();
        let work = Account::local("Work Stuff", "green");
        let work_id = work.id.clone();
        state.add_account(work, Vec::new()).unwrap();
        state.add_task(&home, "Existing", Priority::Low, None).unwrap();

        let parsed = vec![
            ParsedTask {
                title: "Send report".into(),
                account_name_match: "work".into(),
                priority: "High".into(),
                description: None,
                due_date: Some("2024-05-01T09:00:00".into()),
            },
            ParsedTask {
                title: "Mystery".into(),
                account_name_match: "Nowhere".into(),
                priority: "Whenever".into(),
                description: Some("  ".into()),
                due_date: None,
            },
        ];
        state.add_parsed_tasks(parsed).unwrap();

        let tasks = state.tasks();
        assert_eq!(tasks[0].title, "Send report");
        assert_eq!(tasks[0].account_id, work_id);
        assert_eq!(tasks[0].priority, Priority::High);
        assert!(tasks[0].due.is_some());
        assert_eq!(tasks[1].account_id, home);
        assert_eq!(tasks[1].priority, Priority::Medium);
        assert_eq!(tasks[1].description, None);
        assert_eq!(tasks[2].title, "Existing");
    }

    #[test]
    fn parsed_tasks_need_an_account() {
        let mut state = AppState::default();
        assert_eq!(state.add_parsed_tasks(Vec::new()), Err(StateError::NoAccounts));
    }

    #[test]
    fn double_toggle_restores_value() {
        let (mut state, home) = with_local();
        let id = state.add_task(&home, "Laundry", Priority::Low, None).unwrap();
        assert!(state.toggle_completed(&id).unwrap());
        assert!(!state.toggle_completed(&id).unwrap());
        assert!(!state.task(&id).unwrap().completed);
    }

    #[test]
    fn toggle_reaches_nested_subtask() {
        let (mut state, home) = with_local();
        let id = state.add_task(&home, "Trip", Priority::Low, None).unwrap();
        state.apply_breakdown(&id, vec!["Flights".into(), "Hotel".into()]).unwrap();
        let child = state.task(&id).unwrap().sub_tasks[1].id.clone();
        state.apply_breakdown(&child, vec!["Compare prices".into()]).unwrap();
        let grandchild = state.task(&child).unwrap().sub_tasks[0].id.clone();

        assert!(state.toggle_completed(&grandchild).unwrap());
        assert!(state.task(&grandchild).unwrap().completed);
        assert!(!state.task(&id).unwrap().completed);
    }

    #[test]
    fn delete_then_undo_restores_exact_task() {
        let (mut state, home) = with_local();
        let a = state.add_task(&home, "A", Priority::High, None).unwrap();
        state.add_task(&home, "B", Priority::Low, None).unwrap();
        let before = state.task(&a).unwrap().clone();
        let now = Utc::now();

        state.delete_task(&a, now).unwrap();
        assert!(state.task(&a).is_none());
        let restored = state.undo_delete(now + Duration::seconds(2)).unwrap();
        assert_eq!(restored, a);
        // re-appended at the end, not at its old position
        assert_eq!(state.tasks()[1], before);
    }

    #[test]
    fn second_delete_discards_first() {
        let (mut state, home) = with_local();
        let a = state.add_task(&home, "A", Priority::Low, None).unwrap();
        let b = state.add_task(&home, "B", Priority::Low, None).unwrap();
        let now = Utc::now();
        state.delete_task(&a, now).unwrap();
        state.delete_task(&b, now).unwrap();
        assert_eq!(state.undo_delete(now), Some(b));
        assert_eq!(state.undo_delete(now), None);
        assert!(state.task(&a).is_none());
    }

    #[test]
    fn undo_after_window_does_nothing() {
        let (mut state, home) = with_local();
        let a = state.add_task(&home, "A", Priority::Low, None).unwrap();
        let now = Utc::now();
        state.delete_task(&a, now).unwrap();
        assert_eq!(state.undo_delete(now + Duration::seconds(6)), None);
        assert!(state.tasks().is_empty());
    }

    #[test]
    fn replace_data_keeps_one_primary() {
        let google = |name: &str, sub: &str| {
            let mut acc = Account::google(
                &User {
                    name: name.into(),
                    email: format!("{}@example.com", sub),
                    picture: String::new(),
                    sub: Some(sub.into()),
                },
                "blue",
            );
            acc.is_primary = true;
            acc
        };
        let mut state = AppState::default();
        let first = google("First", "1");
        let second = google("Second", "2");
        let third = Account::local("Third", "red");
        state.replace_data(vec![third, first, second], Vec::new(), Vec::new());

        let primaries: Vec<&str> = state
            .accounts()
            .iter()
            .filter(|a| a.is_primary)
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(primaries, vec!["First"]);
        assert_eq!(state.primary_account().unwrap().name, "First");
    }

    #[test]
    fn deleted_subtask_returns_to_its_parent() {
        let (mut state, home) = with_local();
        let id = state.add_task(&home, "Trip", Priority::Low, None).unwrap();
        state.apply_breakdown(&id, vec!["Flights".into(), "Hotel".into()]).unwrap();
        let flights = state.task(&id).unwrap().sub_tasks[0].id.clone();
        let now = Utc::now();
        state.delete_task(&flights, now).unwrap();
        state.undo_delete(now).unwrap();
        let parent = state.task(&id).unwrap();
        assert_eq!(parent.sub_tasks[1].id, flights);
        assert_eq!(state.tasks().len(), 1);
    }

    #[test]
    fn deleting_tag_cascades() {
        let (mut state, home) = with_local();
        let id = state.add_task(&home, "Trip", Priority::Low, None).unwrap();
        state.apply_breakdown(&id, vec!["Flights".into()]).unwrap();
        let child = state.task(&id).unwrap().sub_tasks[0].id.clone();
        let tag = state.add_tag("travel").unwrap();
        assert!(state.toggle_task_tag(&id, &tag).unwrap());
        assert!(state.toggle_task_tag(&child, &tag).unwrap());
        state.select_tag(&tag);

        state.delete_tag(&tag).unwrap();
        assert!(state.tags().is_empty());
        assert!(state.task(&id).unwrap().tags.is_empty());
        assert!(state.task(&child).unwrap().tags.is_empty());
        assert_eq!(state.selection(), &Selection::All);
    }

    #[test]
    fn toggle_tag_twice_removes_it() {
        let (mut state, home) = with_local();
        let id = state.add_task(&home, "Trip", Priority::Low, None).unwrap();
        let tag = state.add_tag("travel").unwrap();
        assert!(state.toggle_task_tag(&id, &tag).unwrap());
        assert!(!state.toggle_task_tag(&id, &tag).unwrap());
        assert!(state.add_tag("   ").is_err());
    }

    #[test]
    fn manual_reorder_only_in_default_sort() {
        let (mut state, home) = with_local();
        let a = state.add_task(&home, "A", Priority::Low, None).unwrap();
        state.add_task(&home, "B", Priority::Low, None).unwrap();
        let c = state.add_task(&home, "C", Priority::Low, None).unwrap();

        state.move_task(&c, &a).unwrap();
        assert_eq!(ids(&state.visible_tasks()), vec!["C", "A", "B"]);

        state.set_sort(SortOption::Alphabetical);
        assert_eq!(state.move_task(&a, &c), Err(StateError::ReorderLocked));
        assert_eq!(ids(&state.visible_tasks()), vec!["A", "B", "C"]);
    }

    #[test]
    fn reorder_subtasks_at_depth() {
        let (mut state, home) = with_local();
        let id = state.add_task(&home, "Trip", Priority::Low, None).unwrap();
        state
            .apply_breakdown(&id, vec!["One".into(), "Two".into(), "Three".into()])
            .unwrap();
        let subs: Vec<String> = state.task(&id).unwrap().sub_tasks.iter().map(|t| t.id.clone()).collect();
        state.reorder_subtasks(&id, &subs[0], &subs[2]).unwrap();
        let titles: Vec<&str> = state
            .task(&id)
            .unwrap()
            .sub_tasks
            .iter()
            .map(|t| t.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Two", "Three", "One"]);
    }

    #[test]
    fn merge_keeps_local_priority_and_tags() {
        let (mut state, home) = with_local();
        let mut local = Task::new(&home, "Old title");
        local.id = "g_1".into();
        local.priority = Priority::High;
        local.tags = vec!["t".into()];
        state.append_tasks(vec![local]);

        let mut remote = Task::new(&home, "New title");
        remote.id = "g_1".into();
        remote.completed = true;
        remote.google_task_id = Some("1".into());
        remote.sub_tasks.push(Task::new(&home, "child"));
        let mut fresh = Task::new(&home, "Brand new");
        fresh.id = "g_2".into();

        let summary = state.merge_remote_tasks(vec![remote, fresh]);
        assert_eq!(summary, MergeSummary { added: 1, updated: 1 });
        let merged = state.task("g_1").unwrap();
        assert_eq!(merged.title, "New title");
        assert!(merged.completed);
        assert_eq!(merged.priority, Priority::High);
        assert_eq!(merged.tags, vec!["t".to_string()]);
        assert_eq!(merged.sub_tasks.len(), 1);
    }

    #[test]
    fn hide_completed_and_search() {
        let (mut state, home) = with_local();
        let a = state.add_task(&home, "Buy milk", Priority::Low, None).unwrap();
        state.add_task(&home, "Buy bread", Priority::Low, None).unwrap();
        state.add_task(&home, "Call mom", Priority::Low, None).unwrap();
        state.toggle_completed(&a).unwrap();

        state.set_show_completed(false);
        state.set_search("buy");
        assert_eq!(ids(&state.visible_tasks()), vec!["Buy bread"]);
    }

    #[test]
    fn due_today_counts_incomplete_only() {
        let (mut state, home) = with_local();
        let now = Utc::now();
        let today = now.with_timezone(&chrono::Local).date_naive();
        let a = state.add_task(&home, "Today", Priority::Low, Some(now)).unwrap();
        state.add_task(&home, "Also today", Priority::Low, Some(now)).unwrap();
        state
            .add_task(&home, "Later", Priority::Low, Some(now + Duration::days(3)))
            .unwrap();
        state.toggle_completed(&a).unwrap();
        assert_eq!(state.due_today_count(today), 1);
    }

    #[test]
    fn heading_follows_selection() {
        let (mut state, home) = with_local();
        assert_eq!(state.heading(), "Home");
        state.select_all();
        assert_eq!(state.heading(), "All Tasks");
        state.select_tag("missing");
        assert_eq!(state.heading(), "Unknown Tag");
        let _ = home;
    }
}
