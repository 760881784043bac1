//! LiftLog CLI - Log workouts from the terminal
//!
//! Works fully offline against the local namespace store; `liftlog sync`
//! reconciles with the remote store when credentials are configured.

use std::env;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use liftlog_core::config::RemoteConfig;
use liftlog_core::models::{RecordMetric, SetKind, SetLog, WorkoutSession};
use liftlog_core::records::RecordTracker;
use liftlog_core::remote::HttpRemoteClient;
use liftlog_core::store::{NamespaceStore, SqliteStore};
use liftlog_core::sync::{AccountEvent, SyncCoordinator};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "liftlog")]
#[command(about = "Offline-first workout tracking from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log a completed set (appended to today's session)
    Log {
        /// Exercise identifier, e.g. "back-squat"
        exercise: String,
        /// Weight lifted
        #[arg(short, long)]
        weight: f64,
        /// Reps performed
        #[arg(short, long)]
        reps: u32,
        /// Intensity rating (RPE)
        #[arg(long)]
        rpe: Option<f64>,
        /// Mark as a warm-up set (excluded from records)
        #[arg(long)]
        warmup: bool,
    },
    /// List recent sessions
    List {
        /// Number of sessions to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show current personal records
    Records {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Soft-delete a session by id
    Delete {
        /// Session id
        id: String,
    },
    /// Reconcile with the remote store
    Sync,
    /// Show pending outbox state
    Status,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] liftlog_core::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(
        "Sync is not configured. Set LIFTLOG_API_URL, LIFTLOG_API_TOKEN and LIFTLOG_ACCOUNT to enable `liftlog sync`."
    )]
    SyncNotConfigured,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(error) = run().await {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let db_path = cli.db_path.clone().unwrap_or_else(default_db_path);

    let store = NamespaceStore::new(SqliteStore::open(&db_path)?);
    let remote = remote_from_env()?.map(HttpRemoteClient::new).transpose()?;
    let coordinator = SyncCoordinator::new(store, remote);
    coordinator
        .handle_account_event(AccountEvent::SessionResolved(account_from_env()))
        .await;

    match cli.command {
        Commands::Log {
            exercise,
            weight,
            reps,
            rpe,
            warmup,
        } => {
            // Populate the view from local data before appending; the guest
            // namespace is active from the start, so the account event above
            // may not have triggered a load.
            coordinator.trigger_sync().await;
            log_set(&coordinator, &exercise, weight, reps, rpe, warmup)
        }
        Commands::List { limit, json } => {
            coordinator.trigger_sync().await;
            list_sessions(&coordinator, limit, json)
        }
        Commands::Records { json } => show_records(&coordinator, json),
        Commands::Delete { id } => {
            coordinator.delete_workout(&id)?;
            println!("Deleted session {id}");
            Ok(())
        }
        Commands::Sync => sync(&coordinator).await,
        Commands::Status => status(&coordinator),
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("liftlog")
        .join("liftlog.db")
}

fn account_from_env() -> Option<String> {
    env::var("LIFTLOG_ACCOUNT").ok()
}

fn remote_from_env() -> Result<Option<RemoteConfig>, CliError> {
    match (env::var("LIFTLOG_API_URL"), env::var("LIFTLOG_API_TOKEN")) {
        (Ok(url), Ok(token)) => Ok(Some(RemoteConfig::new(url, token)?)),
        _ => Ok(None),
    }
}

type Coordinator = SyncCoordinator<SqliteStore, HttpRemoteClient>;

fn log_set(
    coordinator: &Coordinator,
    exercise: &str,
    weight: f64,
    reps: u32,
    rpe: Option<f64>,
    warmup: bool,
) -> Result<(), CliError> {
    let today = chrono::Utc::now().date_naive();
    let mut session = coordinator
        .merged_view()
        .into_iter()
        .find(|session| session.date == today)
        .unwrap_or_else(WorkoutSession::new);

    #[allow(clippy::cast_possible_truncation)]
    let ordinal = session.sets.len() as u32;
    let mut set = SetLog::new(session.id.clone(), exercise, ordinal);
    set.exercise_name = Some(exercise.replace('-', " "));
    set.weight = Some(weight);
    set.reps = Some(reps);
    set.rpe = rpe;
    set.kind = if warmup { SetKind::Warmup } else { SetKind::Working };
    set.completed = true;
    session.push_set(set);

    coordinator.save_workout(&session)?;
    println!(
        "Logged {exercise} {weight}x{reps} (session {}, set {})",
        session.id,
        session.sets.len()
    );

    // Record evaluation runs locally too, so offline PRs show immediately.
    if !warmup {
        let handle = coordinator.current_handle();
        let account = handle.account_id().unwrap_or("guest").to_string();
        let tracker = RecordTracker::new(coordinator.namespace_store(), &handle);
        let completed: Vec<SetLog> = session
            .sets
            .iter()
            .filter(|set| set.completed)
            .cloned()
            .collect();
        for hit in tracker.update_records(&account, &completed)? {
            println!("  New PR: {} {} = {}", hit.exercise_id, hit.metric, hit.value);
        }
    }
    Ok(())
}

fn list_sessions(coordinator: &Coordinator, limit: usize, json: bool) -> Result<(), CliError> {
    let mut sessions = coordinator.merged_view();
    sessions.truncate(limit);

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("No sessions yet. Log one with `liftlog log`.");
        return Ok(());
    }
    for session in sessions {
        let sync_marker = if session.synced { "" } else { " (pending sync)" };
        println!(
            "{}  {}  {} sets, volume {:.0}{sync_marker}",
            session.date,
            session.id,
            session.sets.len(),
            session.total_volume
        );
    }
    Ok(())
}

fn show_records(coordinator: &Coordinator, json: bool) -> Result<(), CliError> {
    let handle = coordinator.current_handle();
    let tracker = RecordTracker::new(coordinator.namespace_store(), &handle);
    let mut records = tracker.current_records()?;
    records.sort_by(|a, b| a.exercise_id.cmp(&b.exercise_id));

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No records yet.");
        return Ok(());
    }
    for record in records {
        let value = if record.metric == RecordMetric::MaxReps {
            format!("{:.0}", record.value)
        } else {
            format!("{:.1}", record.value)
        };
        println!("{}  {}  {value}", record.exercise_id, record.metric);
    }
    Ok(())
}

async fn sync(coordinator: &Coordinator) -> Result<(), CliError> {
    let handle = coordinator.current_handle();
    if handle.account_id().is_none() {
        return Err(CliError::SyncNotConfigured);
    }

    let sessions = coordinator.reload().await?;
    let report = coordinator.flush_outbox().await?;
    println!(
        "Synced: {} sessions, outbox {} processed / {} failed",
        sessions.len(),
        report.processed,
        report.failed
    );
    Ok(())
}

fn status(coordinator: &Coordinator) -> Result<(), CliError> {
    let handle = coordinator.current_handle();
    let queue = liftlog_core::outbox::OutboxQueue::load(coordinator.namespace_store(), &handle)?;

    println!("Namespace: {}", handle.namespace());
    println!("Pending outbox items: {}", queue.len());
    for item in queue.peek_all() {
        println!(
            "  {:?} {}/{} (retries: {})",
            item.op,
            item.collection.as_str(),
            item.entity_id,
            item.retries
        );
    }
    Ok(())
}
