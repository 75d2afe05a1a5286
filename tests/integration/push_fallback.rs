//! Integration tests for falling back from the push channel to HTTP.
//!
//! Validates:
//! - A channel closed by the server raises the degraded banner and later
//!   operations are confirmed over HTTP
//! - With reconnects enabled the channel rejoins and clears the banner
//! - A move the server refuses over the channel is rolled back
//! - An unreachable channel URL leaves the client on request/response
//! - Disabling push never opens the channel
//! - Closing the channel locally switches transports at once

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use kanban::config::ClientConfig;
use kanban::drag::DragEnd;
use kanban::reconcile::{MOVE_FAILED, ReconciliationController, TaskDraft};
use kanban::router::ChangeRouter;
use kanban::session::BoardSession;
use kanban::sync::{self, Delivery, RemoteSyncClient, SyncClient, SyncMode};
use kanban_proto::task::Category;
use kanban_server::server::{AppState, start_server_with_state};

const USER: &str = "alice";

async fn start_server() -> (String, Arc<AppState>) {
    let state = Arc::new(AppState::new());
    state.seed_demo(USER).await.unwrap();
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start kanban server");
    (format!("http://{addr}"), state)
}

fn config(base_url: &str) -> ClientConfig {
    ClientConfig {
        base_url: Some(base_url.to_string()),
        user_id: USER.to_string(),
        ..ClientConfig::default()
    }
}

/// Config whose channel stays down once the server drops it.
fn no_rejoin(base_url: &str) -> ClientConfig {
    let mut config = config(base_url);
    config.sync.reconnect_attempts = 0;
    config
}

async fn open(
    config: &ClientConfig,
) -> (
    Arc<RemoteSyncClient>,
    BoardSession,
    ReconciliationController<RemoteSyncClient>,
) {
    let client = Arc::new(sync::connect(config).await.unwrap());
    let session = BoardSession::start(USER, client.as_ref(), config.board.clone())
        .await
        .unwrap();
    ChangeRouter::for_session(&session).spawn(Arc::clone(&client));
    let controller = ReconciliationController::new(&session, Arc::clone(&client));
    (client, session, controller)
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {what}");
}

#[tokio::test]
async fn server_close_degrades_then_http_confirms() {
    let (base_url, state) = start_server().await;
    let (client, session, controller) = open(&no_rejoin(&base_url)).await;
    assert_eq!(client.mode(), SyncMode::Push);

    state.close_all_connections().await;
    eventually("degraded banner", || session.notices().is_degraded()).await;
    assert_eq!(client.mode(), SyncMode::Request);
    assert!(client.is_connected());

    let delivery = controller
        .commit_create(TaskDraft::new("Over HTTP"))
        .await
        .unwrap();
    let Delivery::Confirmed(task) = delivery else {
        panic!("fallback should confirm");
    };
    assert!(session.board().read(|board| board.find(&task.id).is_some()));
    assert!(state.store.list(USER).await.iter().any(|t| t.id == task.id));
}

#[tokio::test]
async fn moves_persist_while_degraded() {
    let (base_url, state) = start_server().await;
    let (_client, session, controller) = open(&no_rejoin(&base_url)).await;

    state.close_all_connections().await;
    eventually("degraded banner", || session.notices().is_degraded()).await;

    let task = session
        .board()
        .read(|board| board.lane(&Category::ToDo)[0].clone());
    controller
        .commit_move(&DragEnd::new(task.id.clone(), "Done"))
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    let stored = state.store.list(USER).await;
    assert_eq!(
        stored.iter().find(|t| t.id == task.id).unwrap().category,
        Category::Done
    );
    assert_eq!(session.notices().transient(), None);
}

#[tokio::test]
async fn unreachable_channel_uses_http() {
    let (base_url, state) = start_server().await;
    let mut config = config(&base_url);
    config.channel_url = Some("ws://127.0.0.1:1/ws".to_string());
    config.sync.connect_timeout = Duration::from_secs(2);

    let (client, _session, controller) = open(&config).await;
    assert!(client.preferred().is_none());
    assert_eq!(client.mode(), SyncMode::Request);

    let delivery = controller.commit_create(TaskDraft::new("Fine")).await.unwrap();
    assert!(matches!(delivery, Delivery::Confirmed(_)));
    assert_eq!(state.store.list(USER).await.len(), 5);
}

#[tokio::test]
async fn push_disabled_never_joins() {
    let (base_url, state) = start_server().await;
    let mut config = config(&base_url);
    config.sync.prefer_push = false;

    let (client, session, _controller) = open(&config).await;
    assert!(client.preferred().is_none());
    assert_eq!(state.channel_count(USER).await, 0);
    assert!(!session.notices().is_degraded());
}

#[tokio::test]
async fn local_close_switches_transport() {
    let (base_url, _state) = start_server().await;
    let (client, _session, controller) = open(&config(&base_url)).await;

    client.preferred().unwrap().close().await;
    assert_eq!(client.mode(), SyncMode::Request);

    let delivery = controller
        .commit_create(TaskDraft::new("After close"))
        .await
        .unwrap();
    assert!(matches!(delivery, Delivery::Confirmed(_)));
}

#[tokio::test]
async fn channel_rejoins_after_server_close() {
    let (base_url, state) = start_server().await;
    let mut config = config(&base_url);
    config.sync.reconnect_initial_delay = Duration::from_millis(200);
    let (client, session, controller) = open(&config).await;

    state.close_all_connections().await;
    eventually("degraded banner", || session.notices().is_degraded()).await;
    eventually("banner cleared", || !session.notices().is_degraded()).await;
    assert_eq!(client.mode(), SyncMode::Push);
    assert_eq!(state.channel_count(USER).await, 1);

    let delivery = controller
        .commit_create(TaskDraft::new("After rejoin"))
        .await
        .unwrap();
    assert_eq!(delivery, Delivery::Dispatched);
    eventually("echo of the create", || {
        session.board().read(|board| {
            board
                .lane(&Category::ToDo)
                .iter()
                .any(|task| task.title == "After rejoin")
        })
    })
    .await;
}

#[tokio::test]
async fn rejected_move_over_channel_rolls_back() {
    let (base_url, state) = start_server().await;
    let (client, session, controller) = open(&config(&base_url)).await;
    assert_eq!(client.mode(), SyncMode::Push);
    let before = session.board().snapshot();

    // The store loses one To-Do task; moving the other names both.
    let (gone, moved) = session.board().read(|board| {
        let lane = board.lane(&Category::ToDo);
        (lane[0].id.clone(), lane[1].id.clone())
    });
    state.store.delete(&gone).await.unwrap();

    controller
        .commit_move(&DragEnd::new(moved.clone(), "Done"))
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    eventually("rollback", || session.board().snapshot() == before).await;
    assert_eq!(session.notices().transient().as_deref(), Some(MOVE_FAILED));
    assert!(controller.pending_moves().is_empty());
    let stored = state.store.list(USER).await;
    assert_eq!(
        stored.iter().find(|t| t.id == moved).unwrap().category,
        Category::ToDo
    );
}
