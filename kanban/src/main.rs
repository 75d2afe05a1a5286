//! `kanban`: command-line board client.
//!
//! Loads the user's board, runs one command against it and prints the
//! result. Configuration via CLI flags, environment variables, or config
//! file (`~/.config/kanban/config.toml`).
//!
//! ```bash
//! # Offline demo board
//! cargo run --bin kanban -- show
//!
//! # Against a running kanban-server
//! cargo run --bin kanban -- --base-url http://127.0.0.1:5000 --user-id demo \
//!     move demo-1 "In Progress"
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kanban_proto::task::{Category, Task, TaskId};
use tracing_appender::non_blocking::WorkerGuard;

use kanban::config::{CliArgs, ClientConfig, Command};
use kanban::drag::DragTracker;
use kanban::reconcile::{
    EditBuffer, EditOutcome, ReconcileError, ReconciliationController, TaskDraft,
};
use kanban::render;
use kanban::router::ChangeRouter;
use kanban::session::BoardSession;
use kanban::sync::memory::{MemorySyncClient, demo_tasks};
use kanban::sync::{self, BoardSource, Delivery, NotificationSource, SyncClient, SyncError};

/// Errors that end the CLI with a non-zero exit status.
#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("failed to reach the task store: {0}")]
    Connect(SyncError),
    #[error("failed to load the board: {0}")]
    Load(SyncError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!(user_id = %config.user_id, "kanban starting");

    let command = cli.command.unwrap_or(Command::Show);
    let result = match config.base_url {
        None => {
            tracing::info!("no base URL, using the demo board");
            let client = Arc::new(MemorySyncClient::seeded(&config.user_id, demo_tasks()));
            run(client, &config, command, false).await
        }
        Some(_) => match sync::connect(&config).await {
            Ok(client) => {
                let degraded =
                    config.resolved_channel_url().is_some() && client.preferred().is_none();
                run(Arc::new(client), &config, command, degraded).await
            }
            Err(e) => Err(AppError::Connect(e)),
        },
    };

    tracing::info!("kanban exiting");
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(err = %e, "command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown so buffered
/// entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("kanban.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Start a session on `client`, run `command`, and end the session.
async fn run<S>(
    client: Arc<S>,
    config: &ClientConfig,
    command: Command,
    degraded: bool,
) -> Result<(), AppError>
where
    S: SyncClient + BoardSource + NotificationSource + 'static,
{
    let session = BoardSession::start(&config.user_id, client.as_ref(), config.board.clone())
        .await
        .map_err(AppError::Load)?;
    if degraded {
        session.notices().set_degraded(true);
    }

    let router = ChangeRouter::for_session(&session);
    let router_handle = router.spawn(Arc::clone(&client));
    let controller = ReconciliationController::new(&session, client);
    let settle = config.sync.join_timeout;

    let result = match command {
        Command::Show => {
            print_screen(&session);
            Ok(())
        }
        Command::Add {
            title,
            description,
            category,
        } => {
            let draft = TaskDraft::new(title)
                .with_description(description)
                .in_category(category.as_deref().map_or(Category::ToDo, Category::from_label));
            add(&session, &controller, draft, settle).await
        }
        Command::Move { active, over } => {
            move_task(&session, &controller, active, over, settle).await
        }
        Command::Edit {
            id,
            title,
            description,
        } => edit(&session, &controller, TaskId::new(id), title, description, settle).await,
        Command::Delete { id, yes } => {
            delete(&session, &controller, TaskId::new(id), yes, settle).await
        }
        Command::Watch => {
            watch(&session).await;
            Ok(())
        }
    };

    router_handle.abort();
    session.end();
    result
}

async fn add<S: SyncClient>(
    session: &BoardSession,
    controller: &ReconciliationController<S>,
    draft: TaskDraft,
    settle: Duration,
) -> Result<(), AppError> {
    let mut revisions = session.board().subscribe();
    match controller.commit_create(draft).await? {
        Delivery::Confirmed(task) => println!("Added [{}] {}", task.id, task.title),
        Delivery::Dispatched => {
            await_echo(&mut revisions, settle).await;
            println!("Add sent");
        }
    }
    print_screen(session);
    Ok(())
}

async fn move_task<S: SyncClient + 'static>(
    session: &BoardSession,
    controller: &ReconciliationController<S>,
    active: String,
    over: String,
    settle: Duration,
) -> Result<(), AppError> {
    let active = TaskId::new(active);
    let mut tracker = DragTracker::new();
    tracker.on_drag_start(active.clone());
    let drag = tracker.on_drag_end(active, Some(over));

    let Some(handle) = controller.commit_move(&drag) else {
        println!("Nothing to move");
        print_screen(session);
        return Ok(());
    };
    let outcome = match handle.await {
        Ok(outcome) => outcome,
        Err(e) => Err(SyncError::Transport(format!("move task failed: {e}")).into()),
    };
    if outcome.is_ok() {
        await_pushed_moves(session, controller, settle).await;
    }
    print_screen(session);
    outcome.map_err(AppError::from)
}

async fn edit<S: SyncClient>(
    session: &BoardSession,
    controller: &ReconciliationController<S>,
    id: TaskId,
    title: Option<String>,
    description: Option<String>,
    settle: Duration,
) -> Result<(), AppError> {
    let task = session
        .board()
        .read(|board| board.find(&id).cloned())
        .ok_or(ReconcileError::NotFound(id))?;
    let mut buffer = EditBuffer::open(&task);
    if let Some(title) = title {
        buffer.title = title;
    }
    if let Some(description) = description {
        buffer.description = description;
    }

    let mut revisions = session.board().subscribe();
    match controller.commit_edit(&mut buffer).await? {
        EditOutcome::Unchanged => println!("Nothing to change"),
        EditOutcome::Saved(Delivery::Confirmed(task)) => println!("Saved [{}] {}", task.id, task.title),
        EditOutcome::Saved(Delivery::Dispatched) => {
            await_echo(&mut revisions, settle).await;
            if controller.acknowledge_edit(&mut buffer) {
                println!("Saved [{}] {}", buffer.task_id(), buffer.title);
            } else {
                println!("Edit sent");
            }
        }
    }
    print_screen(session);
    Ok(())
}

async fn delete<S: SyncClient>(
    session: &BoardSession,
    controller: &ReconciliationController<S>,
    id: TaskId,
    yes: bool,
    settle: Duration,
) -> Result<(), AppError> {
    let mut revisions = session.board().subscribe();
    let delivery = if yes {
        controller.commit_delete(&id, &|_: &Task| true).await?
    } else {
        controller.commit_delete(&id, &prompt_delete).await?
    };
    if matches!(delivery, Delivery::Dispatched) {
        await_echo(&mut revisions, settle).await;
    }
    println!("Deleted {id}");
    print_screen(session);
    Ok(())
}

/// Print the board on every change until interrupted.
async fn watch(session: &BoardSession) {
    let mut revisions = session.board().subscribe();
    print_screen(session);
    loop {
        tokio::select! {
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                println!();
                print_screen(session);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}

/// Wait for the router to apply the echo of a dispatched intent.
async fn await_echo(revisions: &mut tokio::sync::watch::Receiver<u64>, settle: Duration) {
    if tokio::time::timeout(settle, revisions.changed()).await.is_err() {
        tracing::warn!(
            timeout_ms = settle.as_millis(),
            "no change notification arrived"
        );
    }
}

/// Wait until the server has answered every move pushed by `controller`.
async fn await_pushed_moves<S: SyncClient>(
    session: &BoardSession,
    controller: &ReconciliationController<S>,
    settle: Duration,
) {
    let mut revisions = session.board().subscribe();
    let answered = tokio::time::timeout(settle, async {
        while !controller.pending_moves().is_empty() {
            if revisions.changed().await.is_err() {
                break;
            }
        }
    })
    .await;
    if answered.is_err() {
        tracing::warn!(
            pending = controller.pending_moves().len(),
            "pushed moves still unanswered"
        );
    }
}

fn prompt_delete(task: &Task) -> bool {
    eprint!("Delete \"{}\"? [y/N] ", task.title);
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

fn print_screen(session: &BoardSession) {
    let text = session
        .board()
        .read(|board| render::screen(board, session.notices()));
    print!("{text}");
}
