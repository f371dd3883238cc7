use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::Mutex;

use taskmerge::config::TaskMergeConfig;
use taskmerge::core::account::{self, Account};
use taskmerge::core::snapshot::{self, ExportFile, SnapshotError};
use taskmerge::core::task::{self, Priority, Task};
use taskmerge::state::undo::UNDO_WINDOW_SECS;
use taskmerge::state::view::SortOption;
use taskmerge::state::{AppState, StateError, Theme};
use taskmerge::store::Store;
use taskmerge::sync::anthropic::{self, AnthropicClient};
use taskmerge::sync::keyring;
use taskmerge::sync::drive::BackupOutcome;
use taskmerge::sync::{SyncEngine, SyncError, ToggleOutcome};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("IO: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Usage(String),
}

#[derive(Parser, Debug)]
#[command(name = "taskmerge", author, version, about = "Merge Google Tasks accounts and local lists in one place")]
pub struct Cli {
    #[arg(long, global = true, help = "Config file (default: ~/.config/taskmerge/config.json)")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Directory holding the local data files")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, global = true, help = "Enable debug logging")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(about = "Sign in with Google; the chosen identity becomes the primary account")]
    Login,
    #[command(about = "Sign out")]
    Logout,
    #[command(about = "Show the signed-in user")]
    Whoami,
    #[command(subcommand, about = "Manage accounts and local lists")]
    Accounts(AccountsCommand),
    #[command(about = "List tasks")]
    List {
        #[arg(long, help = "Only tasks of this account (id or name)")]
        account: Option<String>,
        #[arg(long, conflicts_with = "account", help = "Only tasks with this tag (id or name)")]
        tag: Option<String>,
        #[arg(long, help = "Case-insensitive title filter")]
        search: Option<String>,
        #[arg(long, value_parser = parse_sort, help = "default, alphabetical, due-date or priority")]
        sort: Option<SortOption>,
        #[arg(long, conflicts_with = "hide_completed", help = "Include completed tasks")]
        all: bool,
        #[arg(long, help = "Hide completed tasks")]
        hide_completed: bool,
    },
    #[command(about = "Describe tasks in plain language, or ask for a review")]
    Add {
        text: String,
        #[arg(long, help = "Limit a review to this account")]
        account: Option<String>,
    },
    #[command(about = "Add a task manually")]
    New {
        title: String,
        #[arg(long, help = "Account id or name (default: first account)")]
        account: Option<String>,
        #[arg(long, value_parser = parse_priority, default_value = "Medium")]
        priority: Priority,
        #[arg(long, help = "Due date, e.g. 2024-05-01 or 2024-05-01T09:00")]
        due: Option<String>,
    },
    #[command(about = "Toggle a task's completion")]
    Toggle { id: String },
    #[command(about = "Edit a task")]
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<Priority>,
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,
        #[arg(long)]
        clear_due: bool,
    },
    #[command(about = "Delete a task (undoable for a few seconds)")]
    Delete { id: String },
    #[command(about = "Restore the most recently deleted task")]
    Undo,
    #[command(about = "Split a task into subtasks with AI")]
    Breakdown { id: String },
    #[command(about = "Move a task to another task's position")]
    Move { id: String, target: String },
    #[command(about = "Reorder subtasks of one parent")]
    MoveSubtask { parent: String, id: String, target: String },
    #[command(subcommand, about = "Manage tags")]
    Tags(TagsCommand),
    #[command(about = "Import tasks into an account")]
    Import { account: String },
    #[command(about = "Import every Google account")]
    Sync,
    #[command(about = "Export accounts, tasks and tags to a JSON file")]
    Export { path: Option<PathBuf> },
    #[command(about = "Replace local data with an export file")]
    ImportFile {
        path: PathBuf,
        #[arg(long, short = 'y')]
        yes: bool,
    },
    #[command(about = "Back up to Google Drive")]
    Backup,
    #[command(about = "Restore from Google Drive, replacing local data")]
    Restore {
        #[arg(long, short = 'y')]
        yes: bool,
    },
    #[command(subcommand, about = "View preferences")]
    Prefs(PrefsCommand),
    #[command(subcommand, about = "Manage the AI service key")]
    AiKey(AiKeyCommand),
}

#[derive(Subcommand, Debug)]
pub enum AccountsCommand {
    List,
    AddLocal { name: String },
    AddGoogle,
    Rename { account: String, name: String },
    Color { account: String, color: String },
    Unlink { account: String },
    Delete {
        account: String,
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum TagsCommand {
    List,
    Add { name: String },
    Delete { tag: String },
    Toggle { task: String, tag: String },
}

#[derive(Subcommand, Debug)]
pub enum PrefsCommand {
    Show,
    Sort {
        #[arg(value_parser = parse_sort)]
        option: SortOption,
    },
    ShowCompleted {
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },
    Theme {
        #[arg(value_parser = parse_theme)]
        theme: Theme,
    },
}

#[derive(Subcommand, Debug)]
pub enum AiKeyCommand {
    #[command(about = "Store the key; read from stdin when omitted")]
    Set { key: Option<String> },
    Test,
}

fn parse_sort(s: &str) -> Result<SortOption, String> {
    SortOption::from_name(s).ok_or_else(|| format!("unknown sort option '{}'", s))
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    Priority::from_label(s).ok_or_else(|| format!("unknown priority '{}'", s))
}

fn parse_theme(s: &str) -> Result<Theme, String> {
    match s.to_ascii_lowercase().as_str() {
        "light" => Ok(Theme::Light),
        "dark" => Ok(Theme::Dark),
        _ => Err(format!("unknown theme '{}'", s)),
    }
}

fn parse_due_arg(s: &str) -> Result<chrono::DateTime<Utc>, CliError> {
    task::parse_due(s).ok_or_else(|| CliError::Usage(format!("Unrecognized date '{}'", s)))
}

/// Ask on stderr and read y/N from stdin.
fn confirm(prompt: &str, assume_yes: bool) -> Result<bool, CliError> {
    if assume_yes {
        return Ok(true);
    }
    eprint!("{} [y/N] ", prompt);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Loaded state plus everything needed to persist it and reach the
/// remote services.
pub struct App {
    config: TaskMergeConfig,
    store: Store,
    state: Mutex<AppState>,
}

impl App {
    pub fn load(config: TaskMergeConfig) -> Result<Self, CliError> {
        config.ensure_dirs()?;
        let store = Store::new(&config.data_directory);
        let mut state = store.load_state();
        state.expire_undo(Utc::now());
        Ok(Self {
            config,
            store,
            state: Mutex::new(state),
        })
    }

    async fn save(&self) -> Result<(), CliError> {
        let st = self.state.lock().await;
        self.store.save_state(&st)?;
        Ok(())
    }

    fn engine(&self) -> Result<SyncEngine, CliError> {
        Ok(SyncEngine::google(&self.config.google)?)
    }

    async fn ai(&self) -> Result<AnthropicClient, CliError> {
        AnthropicClient::from_keyring(self.config.ai.clone())
            .await
            .ok_or_else(|| CliError::Usage("No AI key stored; run `taskmerge ai-key set` first".into()))
    }

    async fn account_id(&self, key: &str) -> Result<String, CliError> {
        let st = self.state.lock().await;
        st.resolve_account(key)
            .map(|a| a.id.clone())
            .ok_or_else(|| StateError::UnknownAccount(key.into()).into())
    }

    async fn tag_id(&self, key: &str) -> Result<String, CliError> {
        let st = self.state.lock().await;
        st.resolve_tag(key)
            .map(|t| t.id.clone())
            .ok_or_else(|| StateError::UnknownTag(key.into()).into())
    }

    async fn task_id(&self, key: &str) -> Result<String, CliError> {
        resolve_task(&*self.state.lock().await, key)
    }

    pub async fn run(&self, command: Command) -> Result<(), CliError> {
        match command {
            Command::Login => {
                let user = self.engine()?.login(&self.state).await?;
                println!("Signed in as {} <{}>", user.name, user.email);
            }
            Command::Logout => {
                self.engine()?.logout(&self.state).await;
                println!("Signed out");
            }
            Command::Whoami => {
                let st = self.state.lock().await;
                match st.user() {
                    Some(user) => println!("{} <{}>", user.name, user.email),
                    None => println!("Not signed in"),
                }
            }
            Command::Accounts(cmd) => self.accounts(cmd).await?,
            Command::List {
                account,
                tag,
                search,
                sort,
                all,
                hide_completed,
            } => {
                let account = match account {
                    Some(key) => Some(self.account_id(&key).await?),
                    None => None,
                };
                let tag = match tag {
                    Some(key) => Some(self.tag_id(&key).await?),
                    None => None,
                };
                let mut st = self.state.lock().await;
                if let Some(id) = account {
                    st.select_account(&id);
                }
                if let Some(id) = tag {
                    st.select_tag(&id);
                }
                if let Some(query) = search {
                    st.set_search(&query);
                }
                if let Some(sort) = sort {
                    st.set_sort(sort);
                }
                if all {
                    st.set_show_completed(true);
                }
                if hide_completed {
                    st.set_show_completed(false);
                }
                print_list(&st);
                // filters given on the command line are not preferences
                return Ok(());
            }
            Command::Add { text, account } => self.ai_entry(&text, account).await?,
            Command::New {
                title,
                account,
                priority,
                due,
            } => {
                let due = due.as_deref().map(parse_due_arg).transpose()?;
                let account_id = match account {
                    Some(key) => self.account_id(&key).await?,
                    None => {
                        let st = self.state.lock().await;
                        st.accounts().first().map(|a| a.id.clone()).ok_or(StateError::NoAccounts)?
                    }
                };
                let id = self.state.lock().await.add_task(&account_id, &title, priority, due)?;
                println!("Added {}", id);
            }
            Command::Toggle { id } => {
                let id = self.task_id(&id).await?;
                let outcome = self.engine()?.toggle_task(&self.state, &id).await;
                match outcome {
                    Ok(ToggleOutcome::Local(done)) | Ok(ToggleOutcome::Synced(done)) => {
                        println!("{} {}", if done { "Completed" } else { "Reopened" }, id);
                    }
                    Err(e) => {
                        return Err(CliError::Usage(format!("Failed to update task status on Google: {}", e)));
                    }
                }
            }
            Command::Edit {
                id,
                title,
                description,
                priority,
                due,
                clear_due,
            } => {
                let id = self.task_id(&id).await?;
                let due = due.as_deref().map(parse_due_arg).transpose()?;
                let mut st = self.state.lock().await;
                if title.is_some() || description.is_some() {
                    let current = st.task(&id).ok_or_else(|| StateError::UnknownTask(id.clone()))?;
                    let new_title = title.unwrap_or_else(|| current.title.clone());
                    let new_description = description.or_else(|| current.description.clone());
                    st.update_task(&id, &new_title, new_description)?;
                }
                if let Some(priority) = priority {
                    st.set_priority(&id, priority)?;
                }
                if due.is_some() || clear_due {
                    st.set_due(&id, due)?;
                }
                println!("Updated {}", id);
            }
            Command::Delete { id } => {
                let id = self.task_id(&id).await?;
                let mut st = self.state.lock().await;
                let title = st.task(&id).map(|t| t.title.clone()).unwrap_or_default();
                st.delete_task(&id, Utc::now())?;
                println!(
                    "Deleted '{}'. Run `taskmerge undo` within {}s to restore it.",
                    title, UNDO_WINDOW_SECS
                );
            }
            Command::Undo => match self.state.lock().await.undo_delete(Utc::now()) {
                Some(id) => println!("Restored {}", id),
                None => println!("Nothing to undo"),
            },
            Command::Breakdown { id } => {
                let id = self.task_id(&id).await?;
                let title = {
                    let st = self.state.lock().await;
                    st.task(&id).map(|t| t.title.clone()).ok_or_else(|| StateError::UnknownTask(id.clone()))?
                };
                let titles = self.ai().await?.break_down_task(&title).await;
                if titles.is_empty() {
                    println!("No subtasks suggested");
                    return Ok(());
                }
                let count = self.state.lock().await.apply_breakdown(&id, titles)?;
                println!("Added {} subtasks to '{}'", count, title);
            }
            Command::Move { id, target } => {
                let id = self.task_id(&id).await?;
                let target = self.task_id(&target).await?;
                self.state.lock().await.move_task(&id, &target)?;
            }
            Command::MoveSubtask { parent, id, target } => {
                let parent = self.task_id(&parent).await?;
                let id = self.task_id(&id).await?;
                let target = self.task_id(&target).await?;
                self.state.lock().await.reorder_subtasks(&parent, &id, &target)?;
            }
            Command::Tags(cmd) => self.tags(cmd).await?,
            Command::Import { account } => {
                let id = self.account_id(&account).await?;
                let is_google = self.state.lock().await.account(&id).is_some_and(Account::is_google);
                let ai = if is_google { None } else { Some(self.ai().await?) };
                let report = self.engine()?.import_account(&self.state, &id, ai.as_ref()).await?;
                println!("Imported: {} added, {} updated", report.added, report.updated);
            }
            Command::Sync => {
                let report = self.engine()?.sync_all(&self.state).await;
                println!(
                    "Synced {} accounts: {} added, {} updated",
                    report.accounts, report.added, report.updated
                );
                for e in &report.errors {
                    eprintln!("  {}", e);
                }
            }
            Command::Export { path } => {
                let path = path.unwrap_or_else(|| PathBuf::from(snapshot::export_file_name(Local::now().date_naive())));
                let json = {
                    let st = self.state.lock().await;
                    ExportFile::new(st.accounts().to_vec(), st.tasks().to_vec(), st.tags().to_vec()).to_json()?
                };
                std::fs::write(&path, json)?;
                println!("Exported to {}", path.display());
                return Ok(());
            }
            Command::ImportFile { path, yes } => {
                let text = std::fs::read_to_string(&path)?;
                let file = ExportFile::parse(&text)?;
                if !confirm("This will overwrite your current accounts, tasks and tags. Continue?", yes)? {
                    println!("Cancelled");
                    return Ok(());
                }
                self.state.lock().await.replace_data(file.accounts, file.tasks, file.tags);
                println!("Data imported successfully");
            }
            Command::Backup => {
                let outcome = self.engine()?.backup(&self.state).await?;
                match outcome {
                    BackupOutcome::Created => println!("Backup created in Google Drive (App Data folder)"),
                    BackupOutcome::Updated => println!("Backup updated in Google Drive (App Data folder)"),
                }
                return Ok(());
            }
            Command::Restore { yes } => {
                if !confirm(
                    "This will overwrite your current lists with the backup from Google Drive. Continue?",
                    yes,
                )? {
                    println!("Cancelled");
                    return Ok(());
                }
                if self.engine()?.restore(&self.state).await? {
                    println!("Data restored from Google Drive");
                } else {
                    println!("No backup found in Google Drive");
                    return Ok(());
                }
            }
            Command::Prefs(cmd) => {
                let mut st = self.state.lock().await;
                match cmd {
                    PrefsCommand::Show => {
                        let prefs = st.prefs();
                        println!("theme: {:?}", prefs.theme);
                        println!("sort: {}", prefs.sort.as_str());
                        println!("show completed: {}", prefs.show_completed);
                        return Ok(());
                    }
                    PrefsCommand::Sort { option } => st.set_sort(option),
                    PrefsCommand::ShowCompleted { value } => st.set_show_completed(value),
                    PrefsCommand::Theme { theme } => st.set_theme(theme),
                }
            }
            Command::AiKey(cmd) => {
                match cmd {
                    AiKeyCommand::Set { key } => {
                        let key = match key {
                            Some(k) => k,
                            None => {
                                let mut line = String::new();
                                io::stdin().lock().read_line(&mut line)?;
                                line.trim().to_string()
                            }
                        };
                        if key.is_empty() {
                            return Err(CliError::Usage("Empty key".into()));
                        }
                        anthropic::store_api_key(&key).await.map_err(SyncError::Keyring)?;
                        println!("Key stored");
                    }
                    AiKeyCommand::Test => {
                        let message = self.ai().await?.test_api_key().await.map_err(SyncError::Ai)?;
                        println!("{}", message);
                    }
                }
                return Ok(());
            }
        }
        self.save().await
    }

    async fn accounts(&self, cmd: AccountsCommand) -> Result<(), CliError> {
        match cmd {
            AccountsCommand::List => {
                let st = self.state.lock().await;
                for acc in st.accounts() {
                    let count = st.tasks().iter().filter(|t| t.account_id == acc.id).count();
                    println!(
                        "{} {:<10} {:<24} {:<28} {:<7} {:<7} {} tasks",
                        if acc.is_primary { "*" } else { " " },
                        acc.initials,
                        acc.name,
                        acc.email,
                        acc.provider.as_str(),
                        acc.color,
                        count
                    );
                    println!("  {}", acc.id);
                }
            }
            AccountsCommand::AddLocal { name } => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(StateError::EmptyName.into());
                }
                let mut st = self.state.lock().await;
                let acc = Account::local(name, st.next_account_color());
                let id = acc.id.clone();
                st.add_account(acc, Vec::new())?;
                println!("Added local list {} ({})", name, id);
            }
            AccountsCommand::AddGoogle => {
                let acc = self.engine()?.add_google_account(&self.state).await?;
                println!("Connected {} ({})", acc.email, acc.id);
            }
            AccountsCommand::Rename { account, name } => {
                let id = self.account_id(&account).await?;
                self.state.lock().await.rename_account(&id, &name)?;
            }
            AccountsCommand::Color { account, color } => {
                if !account::ACCOUNT_COLORS.contains(&color.as_str()) {
                    return Err(CliError::Usage(format!(
                        "Unknown color '{}'; choose one of {}",
                        color,
                        account::ACCOUNT_COLORS.join(", ")
                    )));
                }
                let id = self.account_id(&account).await?;
                self.state.lock().await.recolor_account(&id, &color)?;
            }
            AccountsCommand::Unlink { account } => {
                let id = self.account_id(&account).await?;
                if !self.state.lock().await.unlink_account(&id)? {
                    return Err(CliError::Usage("The primary account cannot be unlinked".into()));
                }
                println!("Unlinked {}", id);
            }
            AccountsCommand::Delete { account, yes } => {
                let id = self.account_id(&account).await?;
                if self.state.lock().await.account(&id).is_some_and(|a| a.is_primary) {
                    return Err(StateError::PrimaryAccount.into());
                }
                if !confirm("This will remove the account and its tasks. Continue?", yes)? {
                    println!("Cancelled");
                    return Ok(());
                }
                let removed = self.state.lock().await.delete_account(&id)?;
                if removed.is_google() {
                    let key = keyring::refresh_token_key(&removed.email);
                    if let Err(e) = keyring::delete_secret(&key).await {
                        log::warn!("Could not remove stored credentials for {}: {}", removed.email, e);
                    }
                }
                println!("Deleted {}", id);
            }
        }
        Ok(())
    }

    async fn tags(&self, cmd: TagsCommand) -> Result<(), CliError> {
        match cmd {
            TagsCommand::List => {
                let st = self.state.lock().await;
                for tag in st.tags() {
                    println!("{:<20} {:<8} {}", tag.name, tag.color, tag.id);
                }
            }
            TagsCommand::Add { name } => {
                let id = self.state.lock().await.add_tag(&name)?;
                println!("Added tag {}", id);
            }
            TagsCommand::Delete { tag } => {
                let id = self.tag_id(&tag).await?;
                self.state.lock().await.delete_tag(&id)?;
            }
            TagsCommand::Toggle { task, tag } => {
                let task = self.task_id(&task).await?;
                let tag = self.tag_id(&tag).await?;
                let on = self.state.lock().await.toggle_task_tag(&task, &tag)?;
                println!("{} tag", if on { "Added" } else { "Removed" });
            }
        }
        Ok(())
    }

    /// Free-form entry: a review question goes to analysis, anything else
    /// to task extraction.
    async fn ai_entry(&self, text: &str, account: Option<String>) -> Result<(), CliError> {
        let ai = self.ai().await?;
        if anthropic::is_review_request(text) {
            let context = {
                let account = match account {
                    Some(key) => Some(self.account_id(&key).await?),
                    None => None,
                };
                let mut st = self.state.lock().await;
                if let Some(id) = account {
                    st.select_account(&id);
                }
                st.analysis_context()
            };
            println!("{}", ai.analyze_task_list(&context, text).await);
            return Ok(());
        }

        let accounts = self.state.lock().await.accounts().to_vec();
        if accounts.is_empty() {
            return Err(StateError::NoAccounts.into());
        }
        let parsed = ai.parse_tasks_from_input(text, &accounts, Local::now()).await;
        if parsed.is_empty() {
            println!("No tasks recognized");
            return Ok(());
        }
        let mut st = self.state.lock().await;
        let ids = st.add_parsed_tasks(parsed)?;
        for id in ids {
            if let Some(t) = st.task(&id) {
                let account = st.account(&t.account_id).map(|a| a.name.as_str()).unwrap_or("?");
                println!("Added '{}' to {} ({})", t.title, account, id);
            }
        }
        Ok(())
    }
}

/// Exact id, or a unique id prefix, anywhere in the tree.
fn resolve_task(st: &AppState, key: &str) -> Result<String, CliError> {
    if st.task(key).is_some() {
        return Ok(key.to_string());
    }
    let mut matches = Vec::new();
    let mut stack: Vec<&Task> = st.tasks().iter().collect();
    while let Some(t) = stack.pop() {
        if t.id.starts_with(key) {
            matches.push(t.id.clone());
        }
        stack.extend(t.sub_tasks.iter());
    }
    match matches.len() {
        0 => Err(StateError::UnknownTask(key.into()).into()),
        1 => Ok(matches.remove(0)),
        n => Err(CliError::Usage(format!("'{}' matches {} tasks", key, n))),
    }
}

fn print_list(st: &AppState) {
    let visible = st.visible_tasks();
    let today = Local::now().date_naive();
    let due_today = st.due_today_count(today);
    if due_today > 0 {
        println!("{} ({}) - {} due today", st.heading(), visible.len(), due_today);
    } else {
        println!("{} ({})", st.heading(), visible.len());
    }
    for t in visible {
        print_task(st, t, 0);
    }
}

fn print_task(st: &AppState, t: &Task, depth: usize) {
    let indent = "    ".repeat(depth);
    let check = if t.completed { "[x]" } else { "[ ]" };
    let mut line = format!("{}{} {}", indent, check, t.title);
    if depth == 0 {
        line.push_str(&format!("  ({}", t.priority.as_str()));
        if let Some(acc) = st.account(&t.account_id) {
            line.push_str(&format!(", {}", acc.name));
        }
        line.push(')');
    }
    if let Some(due) = t.due {
        line.push_str(&format!("  due {}", due.with_timezone(&Local).format("%Y-%m-%d %H:%M")));
    }
    for tag_id in &t.tags {
        if let Some(tag) = st.tags().iter().find(|g| &g.id == tag_id) {
            line.push_str(&format!("  #{}", tag.name));
        }
    }
    if !t.sub_tasks.is_empty() {
        line.push_str(&format!("  [{}/{}]", t.completed_subtasks(), t.sub_tasks.len()));
    }
    println!("{}  {}", line, t.id);
    for sub in &t.sub_tasks {
        print_task(st, sub, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from(["taskmerge", "--data-dir", "/tmp/x", "list", "--sort", "due-date", "--hide-completed"])
            .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
        match cli.command {
            Command::List { sort, hide_completed, .. } => {
                assert_eq!(sort, Some(SortOption::DueDate));
                assert!(hide_completed);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(Cli::try_parse_from(["taskmerge", "list", "--all", "--hide-completed"]).is_err());
        assert!(Cli::try_parse_from(["taskmerge", "new", "x", "--priority", "urgent"]).is_err());
    }

    #[test]
    fn resolves_task_prefixes() {
        let mut st = AppState::default();
        let acc = Account::local("Home", "blue");
        let acc_id = acc.id.clone();
        st.add_account(acc, Vec::new()).unwrap();
        let a = st.add_task(&acc_id, "A", Priority::Low, None).unwrap();
        st.apply_breakdown(&a, vec!["child".into()]).unwrap();
        let child = st.task(&a).unwrap().sub_tasks[0].id.clone();

        assert_eq!(resolve_task(&st, &a).unwrap(), a);
        assert_eq!(resolve_task(&st, &child[..child.len() - 4]).unwrap(), child);
        assert!(resolve_task(&st, "task_").is_err());
        assert!(resolve_task(&st, "nothing").is_err());
    }
}
