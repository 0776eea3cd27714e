use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use wick::config::WickConfig;
use wick::core::connection::{Connection, ConnectionPatch};
use wick::core::task::{NewTask, Task, TaskFilter, TaskPatch, TaskSource};
use wick::store::{JsonStore, Store};
use wick::sync::{self, ConnectionOutcome, NotionClient, SyncOrchestrator, TaskChanges};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "wick", version, about = "Local tasks, mirrored with Notion to-dos")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add a local task
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Due date, YYYY-MM-DD
        #[arg(long)]
        due: Option<NaiveDate>,
    },
    /// List tasks (open ones unless told otherwise)
    List {
        #[arg(long)]
        all: bool,
        #[arg(long, conflicts_with = "all")]
        done: bool,
        /// Only tasks from this source (local, notion)
        #[arg(long)]
        source: Option<String>,
    },
    /// Mark a task complete
    Done { id: String },
    /// Mark a task open again
    Undo { id: String },
    /// Change a task's title
    Rename { id: String, title: String },
    /// Delete a task
    Rm { id: String },
    /// Test Notion credentials and save a connection
    Connect {
        #[arg(long, env = "WICK_NOTION_TOKEN")]
        token: String,
        /// Page id or notion.so URL
        #[arg(long)]
        page: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// List connections
    Connections,
    /// Remove a connection and its tasks
    Disconnect { id: String },
    /// Resume syncing a connection
    Enable { id: String },
    /// Pause syncing a connection
    Disable { id: String },
    /// Run one sync cycle over every enabled connection
    Sync,
    /// Sync now and then on the configured interval until Ctrl-C
    Daemon,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(WickConfig::default_path);
    let config = WickConfig::load(&config_path)?;

    wick::set_debug_logging(config.debug_logging);
    init_logging(matches!(cli.command, Command::Daemon));

    config.ensure_dirs()?;
    let store = JsonStore::new(&config.data_directory);
    let remote = NotionClient::new(&config.notion_api_url, config.request_timeout())?;
    let orchestrator = SyncOrchestrator::new(store, remote);

    run(cli.command, &config, &orchestrator).await
}

async fn run(
    command: Command,
    config: &WickConfig,
    orch: &SyncOrchestrator<JsonStore, NotionClient>,
) -> CliResult<()> {
    let store = orch.store();

    match command {
        Command::Add {
            title,
            description,
            due,
        } => {
            let mut fields = NewTask::local(title);
            fields.description = description.unwrap_or_default();
            fields.due_date = due;
            let task = store.create_task(fields).await?;
            println!("Added {}", short_id(task.id));
        }
        Command::List { all, done, source } => {
            let source = match source {
                Some(s) => {
                    let source = TaskSource::parse(&s)
                        .ok_or_else(|| format!("unknown source '{}'", s))?;
                    Some(source)
                }
                None => None,
            };
            let filter = TaskFilter {
                source,
                completed: if all { None } else { Some(done) },
                connection_id: None,
            };
            for task in store.list_tasks(&filter).await? {
                print_task(&task);
            }
        }
        Command::Done { id } => set_completed(orch, &id, true).await?,
        Command::Undo { id } => set_completed(orch, &id, false).await?,
        Command::Rename { id, title } => {
            let task = resolve_task(store, &id).await?;
            let patch = TaskPatch {
                title: Some(title),
                ..Default::default()
            };
            if let Some(updated) = store.update_task(task.id, patch).await? {
                let changes = TaskChanges {
                    title: true,
                    ..Default::default()
                };
                orch.reconciler().push_single_task(&updated, changes).await;
                print_task(&updated);
            }
        }
        Command::Rm { id } => {
            let task = resolve_task(store, &id).await?;
            if task.is_remote() {
                println!(
                    "Note: '{}' will return on the next sync unless it is removed in Notion too",
                    task.title
                );
            }
            store.delete_task(task.id).await?;
            println!("Deleted {}", short_id(task.id));
        }
        Command::Connect { token, page, name } => {
            let (connection, info) =
                sync::connect(store, orch.remote(), name, &token, &page).await?;
            println!(
                "Connected '{}' to page '{}' ({})",
                connection.name,
                info.title,
                short_id(connection.id)
            );
            if !info.property_names.is_empty() {
                println!("  properties: {}", info.property_names.join(", "));
            }
        }
        Command::Connections => {
            for connection in store.list_connections().await? {
                print_connection(&connection);
            }
        }
        Command::Disconnect { id } => {
            let connection = resolve_connection(store, &id).await?;
            store.delete_connection(connection.id).await?;
            println!("Removed '{}' and its tasks", connection.name);
        }
        Command::Enable { id } => set_enabled(store, &id, true).await?,
        Command::Disable { id } => set_enabled(store, &id, false).await?,
        Command::Sync => {
            let summary = orch.sync_all().await;
            for outcome in &summary.outcomes {
                match outcome {
                    ConnectionOutcome::Synced { name, report, .. } => println!(
                        "{}: {} items ({} new, {} updated, {} removed)",
                        name, report.item_count, report.created, report.updated, report.deleted
                    ),
                    ConnectionOutcome::Failed { name, error, .. } => {
                        println!("{}: failed: {}", name, error)
                    }
                }
            }
            if summary.outcomes.is_empty() {
                println!("No enabled connections");
            }
        }
        Command::Daemon => {
            log::info!("Starting sync daemon, interval {}s", config.sync_interval().as_secs());
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    log::error!("Failed to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            };
            orch.run(config.sync_interval(), shutdown).await;
        }
    }

    Ok(())
}

async fn set_completed(
    orch: &SyncOrchestrator<JsonStore, NotionClient>,
    id: &str,
    completed: bool,
) -> CliResult<()> {
    let store = orch.store();
    let task = resolve_task(store, id).await?;
    let patch = TaskPatch {
        completed: Some(completed),
        ..Default::default()
    };
    if let Some(updated) = store.update_task(task.id, patch).await? {
        let changes = TaskChanges {
            completed: true,
            ..Default::default()
        };
        orch.reconciler().push_single_task(&updated, changes).await;
        print_task(&updated);
    }
    Ok(())
}

async fn set_enabled(store: &JsonStore, id: &str, enabled: bool) -> CliResult<()> {
    let connection = resolve_connection(store, id).await?;
    let patch = ConnectionPatch {
        enabled: Some(enabled),
        ..Default::default()
    };
    if let Some(updated) = store.update_connection(connection.id, patch).await? {
        print_connection(&updated);
    }
    Ok(())
}

/// Match a full id or a unique prefix of one.
async fn resolve_task(store: &JsonStore, id: &str) -> CliResult<Task> {
    let tasks = store.list_tasks(&TaskFilter::default()).await?;
    pick_unique(tasks, id, |t| t.id, "task")
}

async fn resolve_connection(store: &JsonStore, id: &str) -> CliResult<Connection> {
    let connections = store.list_connections().await?;
    pick_unique(connections, id, |c| c.id, "connection")
}

fn pick_unique<T>(
    items: Vec<T>,
    prefix: &str,
    id_of: impl Fn(&T) -> Uuid,
    what: &str,
) -> CliResult<T> {
    let prefix = prefix.to_ascii_lowercase();
    let mut matches: Vec<T> = items
        .into_iter()
        .filter(|item| id_of(item).to_string().starts_with(&prefix))
        .collect();
    match matches.len() {
        1 => Ok(matches.remove(0)),
        0 => Err(format!("no {} matches '{}'", what, prefix).into()),
        n => Err(format!("'{}' matches {} {}s, use more of the id", prefix, n, what).into()),
    }
}

fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn print_task(task: &Task) {
    let mark = if task.completed { "x" } else { " " };
    let mut line = format!("[{}] {}  {}", mark, short_id(task.id), task.title);
    if let Some(due) = task.due_date {
        line.push_str(&format!("  (due {})", due));
    }
    if !task.source.is_local() {
        line.push_str(&format!("  <{}: {}>", task.source.as_str(), task.description));
    }
    println!("{}", line);
}

fn print_connection(connection: &Connection) {
    let synced = connection
        .last_synced_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "{}  {} [{}]{}  last synced {}",
        short_id(connection.id),
        connection.name,
        connection.kind.as_str(),
        if connection.enabled { "" } else { " (disabled)" },
        synced
    );
}

/// Journal sink that keeps wick's own records from info up (debug when
/// enabled) and everything else from warn up.
struct WickJournal {
    inner: systemd_journal_logger::JournalLog,
}

impl WickJournal {
    fn threshold(target: &str) -> log::LevelFilter {
        match target.split("::").next() {
            Some("wick") if wick::debug_logging() => log::LevelFilter::Debug,
            Some("wick") => log::LevelFilter::Info,
            _ => log::LevelFilter::Warn,
        }
    }
}

impl log::Log for WickJournal {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= Self::threshold(metadata.target())
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            self.inner.log(record);
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Daemon runs log to the systemd user journal (`journalctl --user -t wick -f`);
/// interactive commands, or hosts without a journal, log to stderr.
fn init_logging(daemon: bool) {
    if daemon && systemd_journal_logger::connected_to_journal() {
        match systemd_journal_logger::JournalLog::new() {
            Ok(journal) => {
                let inner = journal.with_syslog_identifier("wick".to_string());
                if log::set_boxed_logger(Box::new(WickJournal { inner })).is_ok() {
                    log::set_max_level(log::LevelFilter::Debug);
                    return;
                }
            }
            Err(e) => eprintln!("wick: journal unavailable, logging to stderr: {}", e),
        }
    }

    let default = match (daemon, wick::debug_logging()) {
        (_, true) => "warn,wick=debug",
        (true, false) => "warn,wick=info",
        (false, false) => "warn",
    };
    let env = env_logger::Env::default().default_filter_or(default);
    let _ = env_logger::Builder::from_env(env).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_threshold_follows_debug_flag() {
        assert_eq!(WickJournal::threshold("wick::sync::reconcile"), log::LevelFilter::Info);
        assert_eq!(WickJournal::threshold("reqwest::connect"), log::LevelFilter::Warn);
        assert_eq!(WickJournal::threshold("wickedness"), log::LevelFilter::Warn);

        wick::set_debug_logging(true);
        assert_eq!(WickJournal::threshold("wick"), log::LevelFilter::Debug);
        assert_eq!(WickJournal::threshold("hyper"), log::LevelFilter::Warn);
        wick::set_debug_logging(false);
    }

    #[test]
    fn ids_resolve_by_unique_prefix() {
        let a = Uuid::parse_str("aaaa1111-0000-4000-8000-000000000000").unwrap();
        let b = Uuid::parse_str("aaaa2222-0000-4000-8000-000000000000").unwrap();

        assert_eq!(pick_unique(vec![a, b], "AAAA1", |u| *u, "task").unwrap(), a);
        assert!(pick_unique(vec![a, b], "aaaa", |u| *u, "task").is_err());
        assert!(pick_unique(vec![a, b], "ffff", |u| *u, "task").is_err());
    }
}
