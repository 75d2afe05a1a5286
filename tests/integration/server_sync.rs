//! Integration tests: clients converging through a running kanban-server.
//!
//! Each test starts the server in-process, opens one or more board sessions
//! over the hybrid client (push channel preferred, HTTP fallback) and checks
//! that every session ends up showing what the store holds.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use kanban::board::Board;
use kanban::config::ClientConfig;
use kanban::drag::DragEnd;
use kanban::reconcile::{MOVE_FAILED, ReconciliationController, TaskDraft};
use kanban::router::ChangeRouter;
use kanban::session::BoardSession;
use kanban::sync::{self, Delivery, RemoteSyncClient, SyncClient, SyncMode};
use kanban_proto::api::CreateTaskRequest;
use kanban_proto::task::{Category, Task, TaskId};
use kanban_server::server::{AppState, start_server_with_state};

struct Client {
    session: BoardSession,
    controller: ReconciliationController<RemoteSyncClient>,
    _router: tokio::task::JoinHandle<()>,
}

async fn start_server() -> (String, Arc<AppState>) {
    let state = Arc::new(AppState::new());
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start kanban server");
    (format!("http://{addr}"), state)
}

async fn open(base_url: &str, user_id: &str) -> Client {
    let config = ClientConfig {
        base_url: Some(base_url.to_string()),
        user_id: user_id.to_string(),
        ..ClientConfig::default()
    };
    let client = Arc::new(sync::connect(&config).await.unwrap());
    assert_eq!(client.mode(), SyncMode::Push);

    let session = BoardSession::start(user_id, client.as_ref(), config.board.clone())
        .await
        .unwrap();
    let router = ChangeRouter::for_session(&session).spawn(Arc::clone(&client));
    let controller = ReconciliationController::new(&session, client);
    Client {
        session,
        controller,
        _router: router,
    }
}

/// Wait until `client`'s board satisfies `pred`.
async fn wait_for(client: &Client, pred: impl Fn(&Board) -> bool) {
    let mut revisions = client.session.board().subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if client.session.board().read(&pred) {
                return;
            }
            revisions.changed().await.unwrap();
        }
    })
    .await
    .expect("board never converged");
}

/// Lane contents by id. Timestamps differ between the store and a board
/// that only saw reorder entries, so boards are compared by layout.
fn layout(board: &Board) -> Vec<(Category, Vec<TaskId>)> {
    board
        .lanes()
        .map(|(category, tasks)| {
            (
                category.clone(),
                tasks.iter().map(|task| task.id.clone()).collect(),
            )
        })
        .collect()
}

async fn store_layout(state: &AppState, user_id: &str) -> Vec<(Category, Vec<TaskId>)> {
    layout(&Board::from_tasks(state.store.list(user_id).await))
}

fn client_layout(client: &Client) -> Vec<(Category, Vec<TaskId>)> {
    client.session.board().read(layout)
}

#[tokio::test]
async fn session_loads_existing_tasks() {
    let (base_url, state) = start_server().await;
    state.seed_demo("alice").await.unwrap();

    let alice = open(&base_url, "alice").await;
    assert_eq!(
        alice.session.board().snapshot(),
        Board::from_tasks(state.store.list("alice").await)
    );
    assert!(!alice.session.notices().is_degraded());
}

#[tokio::test]
async fn create_reaches_every_session_of_the_user() {
    let (base_url, state) = start_server().await;
    let first = open(&base_url, "alice").await;
    let second = open(&base_url, "alice").await;

    let delivery = first
        .controller
        .commit_create(TaskDraft::new("Shared").in_category(Category::InProgress))
        .await
        .unwrap();
    assert_eq!(delivery, Delivery::Dispatched);

    for client in [&first, &second] {
        wait_for(client, |board| board.lane(&Category::InProgress).len() == 1).await;
    }
    let expected = store_layout(&state, "alice").await;
    assert_eq!(client_layout(&first), expected);
    assert_eq!(client_layout(&second), expected);
}

#[tokio::test]
async fn other_users_are_not_notified() {
    let (base_url, _state) = start_server().await;
    let alice = open(&base_url, "alice").await;
    let bob = open(&base_url, "bob").await;

    alice
        .controller
        .commit_create(TaskDraft::new("Private"))
        .await
        .unwrap();
    wait_for(&alice, |board| board.len() == 1).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(bob.session.board().read(Board::is_empty));
}

#[tokio::test]
async fn moves_converge_across_sessions() {
    let (base_url, state) = start_server().await;
    state.seed_demo("alice").await.unwrap();
    let mover = open(&base_url, "alice").await;
    let watcher = open(&base_url, "alice").await;

    let task: Task = mover.session.board().read(|board| board.lane(&Category::ToDo)[0].clone());
    let handle = mover
        .controller
        .commit_move(&DragEnd::new(task.id.clone(), "Done"))
        .expect("move should be planned");
    handle.await.unwrap().unwrap();

    wait_for(&watcher, |board| {
        board
            .find(&task.id)
            .is_some_and(|t| t.category == Category::Done)
    })
    .await;

    let expected = store_layout(&state, "alice").await;
    assert_eq!(client_layout(&mover), expected);
    assert_eq!(client_layout(&watcher), expected);
    assert_eq!(watcher.session.board().snapshot().check_invariants(), Ok(()));
}

#[tokio::test]
async fn rest_changes_from_elsewhere_are_applied() {
    let (base_url, state) = start_server().await;
    let alice = open(&base_url, "alice").await;

    let task = state
        .create_task(CreateTaskRequest {
            title: "From another device".to_string(),
            description: String::new(),
            category: Category::ToDo,
            user_id: "alice".to_string(),
        })
        .await
        .unwrap();
    wait_for(&alice, |board| board.find(&task.id).is_some()).await;

    state.delete_task(&task.id).await.unwrap();
    wait_for(&alice, Board::is_empty).await;
}

#[tokio::test]
async fn rejected_move_is_rolled_back() {
    let (base_url, state) = start_server().await;
    state.seed_demo("alice").await.unwrap();
    let alice = open(&base_url, "alice").await;
    let before = client_layout(&alice);

    // Delete the dragged task behind the client's back: the reorder names
    // a task the store no longer has.
    let task: Task = alice.session.board().read(|board| board.lane(&Category::ToDo)[0].clone());
    state.store.delete(&task.id).await.unwrap();
    let handle = alice
        .controller
        .commit_move(&DragEnd::new(task.id.clone(), "Done"))
        .unwrap();
    handle.await.unwrap().unwrap();

    wait_for(&alice, |board| layout(board) == before).await;
    assert_eq!(
        alice.session.notices().transient().as_deref(),
        Some(MOVE_FAILED)
    );
    assert!(alice.controller.pending_moves().is_empty());
}
