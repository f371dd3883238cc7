use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::account::{Account, User};
use crate::core::snapshot;
use crate::core::tag::Tag;
use crate::core::task::Task;
use crate::state::undo::UndoBuffer;
use crate::state::view::SortOption;
use crate::state::{AppState, Preferences, Theme};

pub const ACCOUNTS_KEY: &str = "tm_accounts";
pub const TASKS_KEY: &str = "tm_tasks";
pub const TAGS_KEY: &str = "tm_tags";
pub const USER_KEY: &str = "tm_user";
pub const THEME_KEY: &str = "theme";
pub const SORT_KEY: &str = "tm_sortOption";
pub const SHOW_COMPLETED_KEY: &str = "tm_showCompleted";
pub const UNDO_KEY: &str = "tm_undo";

/// Key-value persistence: one JSON file per key in the data directory.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Read a key. Missing or unreadable values yield `None`.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let content = std::fs::read_to_string(self.path(key)).ok()?;
        match snapshot::from_json(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("Ignoring unreadable {}: {}", key, e);
                None
            }
        }
    }

    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(self.path(key), json)
    }

    pub fn remove(&self, key: &str) -> std::io::Result<()> {
        match std::fs::remove_file(self.path(key)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Rebuild the application state from every key, defaulting the
    /// missing ones.
    pub fn load_state(&self) -> AppState {
        let user: Option<User> = self.load(USER_KEY);
        let accounts: Vec<Account> = self.load(ACCOUNTS_KEY).unwrap_or_default();
        let tasks: Vec<Task> = self.load(TASKS_KEY).unwrap_or_default();
        let tags: Vec<Tag> = self.load(TAGS_KEY).unwrap_or_default();
        let defaults = Preferences::default();
        let prefs = Preferences {
            theme: self.load::<Theme>(THEME_KEY).unwrap_or(defaults.theme),
            sort: self.load::<SortOption>(SORT_KEY).unwrap_or(defaults.sort),
            show_completed: self.load::<bool>(SHOW_COMPLETED_KEY).unwrap_or(defaults.show_completed),
        };
        let undo: UndoBuffer = self.load(UNDO_KEY).unwrap_or_default();
        log::debug!(
            "Loaded {} accounts, {} tasks, {} tags from {}",
            accounts.len(),
            tasks.len(),
            tags.len(),
            self.dir.display()
        );
        AppState::new(user, accounts, tasks, tags, prefs, undo)
    }

    /// Write every key. The user key is removed when nobody is signed in.
    pub fn save_state(&self, state: &AppState) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        self.save(ACCOUNTS_KEY, state.accounts())?;
        self.save(TASKS_KEY, state.tasks())?;
        self.save(TAGS_KEY, state.tags())?;
        match state.user() {
            Some(user) => self.save(USER_KEY, user)?,
            None => self.remove(USER_KEY)?,
        }
        let prefs = state.prefs();
        self.save(THEME_KEY, &prefs.theme)?;
        self.save(SORT_KEY, &prefs.sort)?;
        self.save(SHOW_COMPLETED_KEY, &prefs.show_completed)?;
        self.save(UNDO_KEY, state.undo_buffer())?;
        Ok(())
    }
}
