pub mod anthropic;
pub mod auth;
pub mod drive;
pub mod google_tasks;
pub mod keyring;
pub mod token;
pub mod tree;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Mutex as StdMutex;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::config::GoogleConfig;
use crate::core::account::{Account, User};
use crate::core::snapshot::{AppData, SnapshotError};
use crate::core::task::{Priority, Task};
use crate::state::{AppState, MergeSummary, StateError};
use anthropic::AnthropicClient;
use auth::{AuthMode, Authorizer, GoogleAuthorizer, Grant};
use drive::{BackupOutcome, BackupRemote, DriveClient};
use google_tasks::{GoogleTasksClient, TaskRemote};
use token::CredentialCache;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Authorization failed: {0}")]
    Auth(String),
    #[error("Not authorized for {0}; run `taskmerge login` or re-add the account")]
    AuthRequired(String),
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Keyring: {0}")]
    Keyring(String),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("Not a Google account: {0}")]
    NotGoogleAccount(String),
    #[error("You must be logged in with a Google account to use Drive backup.")]
    NoPrimaryAccount,
    #[error("An update for task {0} is still in flight")]
    ToggleInFlight(String),
    #[error("Configuration: {0}")]
    Config(String),
    #[error("AI service: {0}")]
    Ai(String),
}

impl SyncError {
    /// Errors an interactive consent prompt might fix.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Auth(_) | Self::AuthRequired(_) => true,
            Self::Api { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}

/// Turn a non-success response into `SyncError::Api`, preferring the
/// server's own `error.message`.
pub(crate) async fn check_response(
    resp: reqwest::Response,
    context: &str,
) -> Result<reqwest::Response, SyncError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = api_error_message(&body)
        .unwrap_or_else(|| format!("{} ({})", context, status.as_u16()));
    Err(SyncError::Api {
        status: status.as_u16(),
        message,
    })
}

pub(crate) fn api_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value["error"]["message"].as_str().map(str::to_string)
}

/// Result of a completion toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Task is not linked to a remote record; only local state changed.
    Local(bool),
    /// The remote record was updated to match.
    Synced(bool),
}

/// Result of importing one account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub added: usize,
    pub updated: usize,
}

impl From<MergeSummary> for ImportReport {
    fn from(m: MergeSummary) -> Self {
        Self {
            added: m.added,
            updated: m.updated,
        }
    }
}

/// Result of syncing every linked account.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub accounts: usize,
    pub added: usize,
    pub updated: usize,
    /// Non-fatal per-account errors.
    pub errors: Vec<String>,
}

/// Remote link of a task captured before its optimistic flip.
struct RemoteLink {
    account: Account,
    hint: String,
    list_id: String,
    remote_id: String,
}

/// Marks a task as having a remote update in flight; cleared on drop.
struct InFlight<'a> {
    set: &'a StdMutex<HashSet<String>>,
    id: String,
}

impl<'a> InFlight<'a> {
    fn acquire(set: &'a StdMutex<HashSet<String>>, id: &str) -> Option<Self> {
        let mut guard = set.lock().unwrap_or_else(|e| e.into_inner());
        if !guard.insert(id.to_string()) {
            return None;
        }
        Some(Self {
            set,
            id: id.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut guard = self.set.lock().unwrap_or_else(|e| e.into_inner());
        guard.remove(&self.id);
    }
}

/// Talks to the remote services on behalf of an `AppState`.
///
/// Every remote call goes through `authorized`, which owns the
/// silent-then-interactive credential policy.
pub struct SyncEngine {
    authorizer: Box<dyn Authorizer>,
    tasks: Box<dyn TaskRemote>,
    backup: Box<dyn BackupRemote>,
    cache: Mutex<CredentialCache>,
    in_flight: StdMutex<HashSet<String>>,
}

impl SyncEngine {
    pub fn new(
        authorizer: Box<dyn Authorizer>,
        tasks: Box<dyn TaskRemote>,
        backup: Box<dyn BackupRemote>,
    ) -> Self {
        Self {
            authorizer,
            tasks,
            backup,
            cache: Mutex::new(CredentialCache::default()),
            in_flight: StdMutex::new(HashSet::new()),
        }
    }

    /// Engine wired to the real Google endpoints.
    pub fn google(config: &GoogleConfig) -> Result<Self, SyncError> {
        Ok(Self::new(
            Box::new(GoogleAuthorizer::new(config.clone())?),
            Box::new(GoogleTasksClient::new(&config.tasks_api_base)?),
            Box::new(DriveClient::new(&config.drive_api_base, &config.drive_upload_base)?),
        ))
    }

    /// A token for `account`. Silent requests use the cache when the cached
    /// token is not about to expire; interactive requests always prompt.
    pub async fn token(&self, account: &Account, hint: &str, mode: AuthMode) -> Result<String, SyncError> {
        if !account.is_google() {
            return Err(SyncError::NotGoogleAccount(account.name.clone()));
        }
        if mode == AuthMode::Silent {
            if let Some(token) = self.cache.lock().await.get(&account.id, Utc::now()) {
                return Ok(token.to_string());
            }
        }
        let grant = self.authorizer.authorize(hint, mode).await?;
        if let Some(profile) = &grant.profile {
            if !profile.email.eq_ignore_ascii_case(&account.email) {
                log::warn!("Consent for {} came back as {}", account.email, profile.email);
                return Err(SyncError::Auth("Signed in as a different account".into()));
            }
        }
        self.remember(&account.id, &grant).await;
        Ok(grant.access_token)
    }

    async fn remember(&self, account_id: &str, grant: &Grant) {
        self.cache
            .lock()
            .await
            .insert(account_id, &grant.access_token, grant.expires_in, Utc::now());
    }

    /// Run `call` with a silently obtained token. If either the token
    /// request or the call fails with an authorization error, retry once
    /// with an interactive prompt.
    pub async fn authorized<T, F, Fut>(&self, account: &Account, hint: &str, call: F) -> Result<T, SyncError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let silent = match self.token(account, hint, AuthMode::Silent).await {
            Ok(token) => call(token).await,
            Err(e) => Err(e),
        };
        match silent {
            Err(e) if e.is_auth() => {
                log::info!("Silent authorization for {} failed ({}), prompting", account.email, e);
                let token = self.token(account, hint, AuthMode::Interactive).await?;
                call(token).await
            }
            other => other,
        }
    }

    // ---- session ----

    /// Interactive sign-in. The chosen identity becomes the primary account.
    pub async fn login(&self, state: &Mutex<AppState>) -> Result<User, SyncError> {
        let grant = self.authorizer.authorize("", AuthMode::Interactive).await?;
        let user = grant
            .profile
            .clone()
            .ok_or_else(|| SyncError::Auth("No profile returned by sign-in".into()))?;
        let primary = state.lock().await.sign_in(user.clone());
        self.remember(&primary, &grant).await;
        Ok(user)
    }

    pub async fn logout(&self, state: &Mutex<AppState>) {
        state.lock().await.sign_out();
        self.cache.lock().await.clear();
    }

    /// Connect another Google identity and import its tasks. A failed task
    /// import still adds the (empty) account.
    pub async fn add_google_account(&self, state: &Mutex<AppState>) -> Result<Account, SyncError> {
        let grant = self.authorizer.authorize("", AuthMode::Interactive).await?;
        let profile = grant
            .profile
            .clone()
            .ok_or_else(|| SyncError::Auth("No profile returned by sign-in".into()))?;
        if profile.email.is_empty() {
            return Err(SyncError::Auth("Could not retrieve email from Google profile.".into()));
        }

        let color = state.lock().await.next_account_color();
        let account = Account::google(&profile, color);

        let tasks = match self.fetch_remote_tasks(&grant.access_token, &account.id).await {
            Ok(t) => t,
            Err(e) => {
                log::warn!("Task import for {} failed: {}", account.email, e);
                Vec::new()
            }
        };

        state.lock().await.add_account(account.clone(), tasks)?;
        self.remember(&account.id, &grant).await;
        log::info!("Connected Google account {}", account.email);
        Ok(account)
    }

    // ---- tasks ----

    /// The tasks of an account's first remote list, as a tree.
    async fn fetch_remote_tasks(&self, token: &str, account_id: &str) -> Result<Vec<Task>, SyncError> {
        let lists = self.tasks.list_task_lists(token).await?;
        let Some(list) = lists.first() else {
            log::info!("No task lists for account {}", account_id);
            return Ok(Vec::new());
        };
        let records = self.tasks.list_tasks(token, &list.id).await?;
        log::debug!("Fetched {} records from list '{}'", records.len(), list.title);
        Ok(tree::build_task_tree(&records, &list.id, account_id))
    }

    /// Pull an account's tasks into local state. Google accounts merge their
    /// first remote list; local lists get AI-generated sample tasks when an
    /// AI client is available.
    pub async fn import_account(
        &self,
        state: &Mutex<AppState>,
        account_id: &str,
        ai: Option<&AnthropicClient>,
    ) -> Result<ImportReport, SyncError> {
        let (account, hint) = {
            let st = state.lock().await;
            let account = st
                .account(account_id)
                .cloned()
                .ok_or_else(|| StateError::UnknownAccount(account_id.into()))?;
            let hint = st.login_hint(&account);
            (account, hint)
        };

        if !account.is_google() {
            let Some(ai) = ai else {
                return Ok(ImportReport::default());
            };
            let tasks: Vec<Task> = ai
                .generate_sample_tasks(&account.name)
                .await
                .into_iter()
                .map(|s| {
                    let mut task = Task::new(account.id.clone(), s.title);
                    task.priority = Priority::from_label(&s.priority).unwrap_or_default();
                    task.description = s.description;
                    task
                })
                .collect();
            let added = state.lock().await.append_tasks(tasks);
            return Ok(ImportReport { added, updated: 0 });
        }

        let account_id = account.id.as_str();
        let fetched = self
            .authorized(&account, &hint, |token| async move {
                self.fetch_remote_tasks(&token, account_id).await
            })
            .await?;
        let summary = state.lock().await.merge_remote_tasks(fetched);
        log::info!(
            "Imported {}: {} added, {} updated",
            account.email,
            summary.added,
            summary.updated
        );
        Ok(summary.into())
    }

    /// Import every Google account in turn. Per-account failures are
    /// collected rather than aborting the run.
    pub async fn sync_all(&self, state: &Mutex<AppState>) -> SyncReport {
        let ids: Vec<String> = state
            .lock()
            .await
            .accounts()
            .iter()
            .filter(|a| a.is_google())
            .map(|a| a.id.clone())
            .collect();

        let mut report = SyncReport::default();
        for id in ids {
            match self.import_account(state, &id, None).await {
                Ok(r) => {
                    report.accounts += 1;
                    report.added += r.added;
                    report.updated += r.updated;
                }
                Err(e) => {
                    log::error!("Sync failed for {}: {}", id, e);
                    report.errors.push(format!("{}: {}", id, e));
                }
            }
        }
        report
    }

    /// Flip a task's completion immediately, then mirror it remotely.
    ///
    /// On remote failure the task is restored to its pre-toggle value and
    /// the error is returned. While a remote update for a task is pending,
    /// further toggles of that task are rejected with `ToggleInFlight`.
    pub async fn toggle_task(&self, state: &Mutex<AppState>, task_id: &str) -> Result<ToggleOutcome, SyncError> {
        let (previous, current, link, _in_flight) = {
            let mut st = state.lock().await;
            let task = st
                .task(task_id)
                .ok_or_else(|| StateError::UnknownTask(task_id.into()))?;
            let previous = task.completed;

            let link = match (&task.google_task_list_id, &task.google_task_id) {
                (Some(list_id), Some(remote_id)) => st
                    .account(&task.account_id)
                    .filter(|a| a.is_google())
                    .map(|account| RemoteLink {
                        account: account.clone(),
                        hint: st.login_hint(account),
                        list_id: list_id.clone(),
                        remote_id: remote_id.clone(),
                    }),
                _ => None,
            };

            let in_flight = if link.is_some() {
                let guard = InFlight::acquire(&self.in_flight, task_id)
                    .ok_or_else(|| SyncError::ToggleInFlight(task_id.into()))?;
                Some(guard)
            } else {
                None
            };

            let current = st.toggle_completed(task_id)?;
            (previous, current, link, in_flight)
        };

        let Some(link) = link else {
            return Ok(ToggleOutcome::Local(current));
        };

        let result = self
            .authorized(&link.account, &link.hint, |token| {
                let list_id = link.list_id.as_str();
                let remote_id = link.remote_id.as_str();
                async move { self.tasks.set_status(&token, list_id, remote_id, current).await }
            })
            .await;

        match result {
            Ok(()) => Ok(ToggleOutcome::Synced(current)),
            Err(e) => {
                log::error!("Failed to update remote status of {}: {}; reverting", task_id, e);
                if let Err(revert) = state.lock().await.set_completed(task_id, previous) {
                    log::warn!("Could not revert {}: {}", task_id, revert);
                }
                Err(e)
            }
        }
    }

    // ---- backup ----

    fn primary(st: &AppState) -> Result<(Account, String), SyncError> {
        let account = st.primary_account().cloned().ok_or(SyncError::NoPrimaryAccount)?;
        let hint = st.login_hint(&account);
        Ok((account, hint))
    }

    /// Save accounts, tasks and tags to the Drive app-data folder.
    pub async fn backup(&self, state: &Mutex<AppState>) -> Result<BackupOutcome, SyncError> {
        let ((account, hint), data) = {
            let st = state.lock().await;
            let data = AppData::new(st.accounts().to_vec(), st.tasks().to_vec(), st.tags().to_vec());
            (Self::primary(&st)?, data)
        };
        let data = &data;
        let outcome = self
            .authorized(&account, &hint, |token| async move {
                drive::save_app_data(self.backup.as_ref(), &token, data).await
            })
            .await?;
        log::info!("Drive backup {:?}", outcome);
        Ok(outcome)
    }

    /// Overwrite local data with the Drive backup. Returns false when no
    /// backup exists.
    pub async fn restore(&self, state: &Mutex<AppState>) -> Result<bool, SyncError> {
        let (account, hint) = Self::primary(&*state.lock().await)?;
        let data = self
            .authorized(&account, &hint, |token| async move {
                drive::load_app_data(self.backup.as_ref(), &token).await
            })
            .await?;
        match data {
            Some(data) => {
                state.lock().await.replace_data(data.accounts, data.tasks, data.tags);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::state::{Preferences, undo::UndoBuffer};
    use super::google_tasks::{RemoteTask, RemoteTaskList};

    #[derive(Default)]
    struct FakeAuth {
        silent_fails: bool,
        /// Identity picked on the consent screen; `sam@example.com` when unset.
        consent_email: Option<&'static str>,
        silent_calls: Arc<AtomicUsize>,
        interactive_calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Authorizer for FakeAuth {
        async fn authorize(&self, _hint: &str, mode: AuthMode) -> Result<Grant, SyncError> {
            match mode {
                AuthMode::Silent => {
                    self.silent_calls.fetch_add(1, Ordering::SeqCst);
                    if self.silent_fails {
                        return Err(SyncError::AuthRequired("test".into()));
                    }
                    Ok(Grant::new("silent-token", Some(3600)))
                }
                AuthMode::Interactive => {
                    self.interactive_calls.fetch_add(1, Ordering::SeqCst);
                    let mut grant = Grant::new("interactive-token", Some(3600));
                    grant.profile = Some(User {
                        name: "Sam Doe".into(),
                        email: self.consent_email.unwrap_or("sam@example.com").into(),
                        picture: String::new(),
                        sub: Some("7".into()),
                    });
                    Ok(grant)
                }
            }
        }
    }

    #[derive(Default)]
    struct FakeTasks {
        fail_status: bool,
        records: Vec<RemoteTask>,
        status_calls: Arc<StdMutex<Vec<(String, String, bool)>>>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl TaskRemote for FakeTasks {
        async fn list_task_lists(&self, _token: &str) -> Result<Vec<RemoteTaskList>, SyncError> {
            Ok(vec![RemoteTaskList {
                id: "L1".into(),
                title: "My Tasks".into(),
            }])
        }

        async fn list_tasks(&self, _token: &str, _list_id: &str) -> Result<Vec<RemoteTask>, SyncError> {
            Ok(self.records.clone())
        }

        async fn set_status(&self, token: &str, _list_id: &str, task_id: &str, completed: bool) -> Result<(), SyncError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.status_calls
                .lock()
                .unwrap()
                .push((token.to_string(), task_id.to_string(), completed));
            if self.fail_status {
                return Err(SyncError::Api {
                    status: 500,
                    message: "backend down".into(),
                });
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeDrive {
        file: StdMutex<Option<String>>,
    }

    #[async_trait]
    impl BackupRemote for FakeDrive {
        async fn find_backup(&self, _token: &str) -> Result<Option<String>, SyncError> {
            Ok(self.file.lock().unwrap().as_ref().map(|_| "file-1".to_string()))
        }

        async fn create_backup(&self, _token: &str, content: &str) -> Result<(), SyncError> {
            *self.file.lock().unwrap() = Some(content.to_string());
            Ok(())
        }

        async fn update_backup(&self, _token: &str, _file_id: &str, content: &str) -> Result<(), SyncError> {
            *self.file.lock().unwrap() = Some(content.to_string());
            Ok(())
        }

        async fn download_backup(&self, _token: &str, _file_id: &str) -> Result<String, SyncError> {
            Ok(self.file.lock().unwrap().clone().unwrap_or_default())
        }
    }

    fn record(id: &str, parent: Option<&str>) -> RemoteTask {
        RemoteTask {
            id: id.into(),
            title: Some(format!("Task {}", id)),
            notes: None,
            status: "needsAction".into(),
            due: None,
            parent: parent.map(str::to_string),
        }
    }

    fn google_state() -> (AppState, String) {
        let mut acc = Account::google(
            &User {
                name: "Sam Doe".into(),
                email: "sam@example.com".into(),
                picture: String::new(),
                sub: Some("7".into()),
            },
            "blue",
        );
        acc.is_primary = true;
        let id = acc.id.clone();
        let mut task = Task::new(id.clone(), "Linked");
        task.id = "g_1".into();
        task.google_task_id = Some("1".into());
        task.google_task_list_id = Some("L1".into());
        let mut child = Task::new(id.clone(), "Linked child");
        child.id = "g_2".into();
        child.google_task_id = Some("2".into());
        child.google_task_list_id = Some("L1".into());
        task.sub_tasks.push(child);
        let local = Task::new(id.clone(), "Unlinked");
        let state = AppState::new(
            None,
            vec![acc],
            vec![task, local],
            Vec::new(),
            Preferences::default(),
            UndoBuffer::default(),
        );
        (state, id)
    }

    fn engine(auth: FakeAuth, tasks: FakeTasks) -> SyncEngine {
        SyncEngine::new(Box::new(auth), Box::new(tasks), Box::new(FakeDrive::default()))
    }

    #[tokio::test]
    async fn toggle_syncs_linked_task() {
        let (state, _) = google_state();
        let state = Mutex::new(state);
        let engine = engine(FakeAuth::default(), FakeTasks::default());

        let outcome = engine.toggle_task(&state, "g_1").await.unwrap();
        assert_eq!(outcome, ToggleOutcome::Synced(true));
        assert!(state.lock().await.task("g_1").unwrap().completed);
    }

    #[tokio::test]
    async fn toggle_nested_subtask_patches_its_own_record() {
        let (state, _) = google_state();
        let state = Mutex::new(state);
        let tasks = FakeTasks::default();
        let calls = tasks.status_calls.clone();
        let engine = engine(FakeAuth::default(), tasks);

        engine.toggle_task(&state, "g_2").await.unwrap();
        assert!(state.lock().await.task("g_2").unwrap().completed);
        assert!(!state.lock().await.task("g_1").unwrap().completed);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[("silent-token".to_string(), "2".to_string(), true)]);
    }

    #[tokio::test]
    async fn failed_remote_update_rolls_back() {
        let (state, _) = google_state();
        let state = Mutex::new(state);
        let engine = engine(
            FakeAuth::default(),
            FakeTasks {
                fail_status: true,
                ..Default::default()
            },
        );

        let err = engine.toggle_task(&state, "g_2").await.unwrap_err();
        assert!(matches!(err, SyncError::Api { status: 500, .. }));
        assert!(!state.lock().await.task("g_2").unwrap().completed);
        // the guard is released, so the next toggle reaches the remote again
        let again = engine.toggle_task(&state, "g_2").await;
        assert!(matches!(again, Err(SyncError::Api { status: 500, .. })));
    }

    #[tokio::test]
    async fn unlinked_task_toggles_locally() {
        let (state, _) = google_state();
        let local_id = state.tasks()[1].id.clone();
        let state = Mutex::new(state);
        let engine = engine(FakeAuth::default(), FakeTasks::default());

        assert_eq!(engine.toggle_task(&state, &local_id).await.unwrap(), ToggleOutcome::Local(true));
        assert_eq!(engine.toggle_task(&state, &local_id).await.unwrap(), ToggleOutcome::Local(false));
    }

    #[tokio::test]
    async fn silent_failure_falls_back_to_interactive() {
        let (state, _) = google_state();
        let state = Mutex::new(state);
        let auth = FakeAuth {
            silent_fails: true,
            ..Default::default()
        };
        let interactive = auth.interactive_calls.clone();
        let tasks = FakeTasks::default();
        let calls = tasks.status_calls.clone();
        let engine = engine(auth, tasks);

        engine.toggle_task(&state, "g_1").await.unwrap();
        assert!(state.lock().await.task("g_1").unwrap().completed);
        assert_eq!(interactive.load(Ordering::SeqCst), 1);
        assert_eq!(calls.lock().unwrap()[0].0, "interactive-token");
    }

    #[tokio::test]
    async fn consent_for_another_identity_is_refused() {
        let (state, _) = google_state();
        let state = Mutex::new(state);
        let auth = FakeAuth {
            silent_fails: true,
            consent_email: Some("someone.else@example.com"),
            ..Default::default()
        };
        let tasks = FakeTasks::default();
        let calls = tasks.status_calls.clone();
        let engine = engine(auth, tasks);

        let err = engine.toggle_task(&state, "g_1").await.unwrap_err();
        assert!(matches!(err, SyncError::Auth(ref m) if m == "Signed in as a different account"));
        assert!(!state.lock().await.task("g_1").unwrap().completed);
        assert!(calls.lock().unwrap().is_empty());

        let account = state.lock().await.primary_account().cloned().unwrap();
        assert!(engine.cache.lock().await.get(&account.id, Utc::now()).is_none());
    }

    #[tokio::test]
    async fn consent_email_match_ignores_case() {
        let (state, _) = google_state();
        let account = state.primary_account().cloned().unwrap();
        let auth = FakeAuth {
            consent_email: Some("SAM@Example.com"),
            ..Default::default()
        };
        let engine = engine(auth, FakeTasks::default());
        let token = engine.token(&account, "", AuthMode::Interactive).await.unwrap();
        assert_eq!(token, "interactive-token");
    }

    #[tokio::test]
    async fn cached_token_skips_authorizer() {
        let (state, _) = google_state();
        let account = state.accounts()[0].clone();
        let auth = FakeAuth::default();
        let silent = auth.silent_calls.clone();
        let engine = engine(auth, FakeTasks::default());

        let first = engine.token(&account, "", AuthMode::Silent).await.unwrap();
        let second = engine.token(&account, "", AuthMode::Silent).await.unwrap();
        assert_eq!(first, "silent-token");
        assert_eq!(second, first);
        assert_eq!(silent.load(Ordering::SeqCst), 1);
        let interactive = engine.token(&account, "", AuthMode::Interactive).await.unwrap();
        assert_eq!(interactive, "interactive-token");
    }

    #[tokio::test]
    async fn local_account_cannot_get_token() {
        let account = Account::local("Home", "blue");
        let engine = engine(FakeAuth::default(), FakeTasks::default());
        let err = engine.token(&account, "", AuthMode::Silent).await.unwrap_err();
        assert!(matches!(err, SyncError::NotGoogleAccount(_)));
    }

    #[tokio::test]
    async fn overlapping_toggle_is_rejected() {
        let (state, _) = google_state();
        let state = Mutex::new(state);
        let gate = Arc::new(Notify::new());
        let engine = engine(
            FakeAuth::default(),
            FakeTasks {
                gate: Some(gate.clone()),
                ..Default::default()
            },
        );

        let first = engine.toggle_task(&state, "g_1");
        let second = async {
            tokio::task::yield_now().await;
            let r = engine.toggle_task(&state, "g_1").await;
            gate.notify_one();
            r
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.unwrap(), ToggleOutcome::Synced(true));
        assert!(matches!(second, Err(SyncError::ToggleInFlight(_))));
        assert!(state.lock().await.task("g_1").unwrap().completed);
    }

    #[tokio::test]
    async fn import_builds_tree_and_merges() {
        let (state, account_id) = google_state();
        let state = Mutex::new(state);
        let engine = engine(
            FakeAuth::default(),
            FakeTasks {
                records: vec![record("1", None), record("2", Some("1")), record("3", None)],
                ..Default::default()
            },
        );

        let report = engine.import_account(&state, &account_id, None).await.unwrap();
        assert_eq!(report, ImportReport { added: 1, updated: 1 });
        let st = state.lock().await;
        assert_eq!(st.task("g_1").unwrap().title, "Task 1");
        assert_eq!(st.task("g_1").unwrap().sub_tasks[0].id, "g_2");
        assert!(st.task("g_3").is_some());
    }

    #[tokio::test]
    async fn login_creates_primary_and_caches_token() {
        let state = Mutex::new(AppState::default());
        let engine = engine(FakeAuth::default(), FakeTasks::default());
        let user = engine.login(&state).await.unwrap();
        assert_eq!(user.email, "sam@example.com");

        let account = state.lock().await.primary_account().cloned().unwrap();
        let token = engine.token(&account, "", AuthMode::Silent).await.unwrap();
        assert_eq!(token, "interactive-token");

        engine.logout(&state).await;
        assert!(state.lock().await.user().is_none());
        let token = engine.token(&account, "", AuthMode::Silent).await.unwrap();
        assert_eq!(token, "silent-token");
    }

    #[tokio::test]
    async fn add_google_account_imports_tasks() {
        let state = Mutex::new(AppState::default());
        let engine = engine(
            FakeAuth::default(),
            FakeTasks {
                records: vec![record("a", None), record("b", Some("a"))],
                ..Default::default()
            },
        );
        let account = engine.add_google_account(&state).await.unwrap();
        let st = state.lock().await;
        assert_eq!(st.accounts().len(), 1);
        assert_eq!(st.tasks().len(), 1);
        assert_eq!(st.tasks()[0].account_id, account.id);
        assert_eq!(st.tasks()[0].sub_tasks.len(), 1);
    }

    #[tokio::test]
    async fn backup_then_restore_round_trips() {
        let (state, _) = google_state();
        let original_tasks = state.tasks().to_vec();
        let state = Mutex::new(state);
        let engine = engine(FakeAuth::default(), FakeTasks::default());

        assert_eq!(engine.backup(&state).await.unwrap(), BackupOutcome::Created);
        assert_eq!(engine.backup(&state).await.unwrap(), BackupOutcome::Updated);

        state.lock().await.replace_data(Vec::new(), Vec::new(), Vec::new());
        assert!(matches!(engine.restore(&state).await, Err(SyncError::NoPrimaryAccount)));

        let (fresh, _) = google_state();
        let fresh_accounts = fresh.accounts().to_vec();
        *state.lock().await = fresh;
        state.lock().await.replace_data(fresh_accounts, Vec::new(), Vec::new());
        assert!(engine.restore(&state).await.unwrap());
        assert_eq!(state.lock().await.tasks(), original_tasks.as_slice());
    }

    #[test]
    fn auth_classification() {
        assert!(SyncError::Api { status: 401, message: String::new() }.is_auth());
        assert!(!SyncError::Api { status: 500, message: String::new() }.is_auth());
        assert!(SyncError::AuthRequired("x".into()).is_auth());
        assert_eq!(
            api_error_message(r#"{"error": {"code": 404, "message": "Task list not found."}}"#),
            Some("Task list not found.".to_string())
        );
        assert_eq!(api_error_message("<html>"), None);
    }
}
