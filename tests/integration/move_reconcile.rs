//! Integration tests for optimistic moves against a running kanban-server.
//!
//! Uses the request/response client, so every persist call is answered by
//! the store and a refusal rolls the board back:
//! - Moves are visible at once and match the store after persisting
//! - A move naming a task the store lost is rolled back with a notice
//! - An unreachable store rolls the move back
//! - Creates, edits and deletes round-trip through the store

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use kanban::board::Board;
use kanban::config::BoardSettings;
use kanban::drag::DragEnd;
use kanban::reconcile::{
    EditBuffer, EditOutcome, MOVE_FAILED, ReconcileError, ReconciliationController, TaskDraft,
};
use kanban::session::BoardSession;
use kanban::sync::http::HttpSyncClient;
use kanban::sync::{Delivery, SyncError};
use kanban_proto::task::{Category, Task, TaskId};
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

fn http(base_url: &str) -> Arc<HttpSyncClient> {
    Arc::new(HttpSyncClient::new(base_url, Duration::from_secs(5)).unwrap())
}

async fn open(base_url: &str) -> (BoardSession, ReconciliationController<HttpSyncClient>) {
    let client = http(base_url);
    let session = BoardSession::start(USER, client.as_ref(), BoardSettings::default())
        .await
        .unwrap();
    let controller = ReconciliationController::new(&session, client);
    (session, controller)
}

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

async fn store_layout(state: &AppState) -> Vec<(Category, Vec<TaskId>)> {
    layout(&Board::from_tasks(state.store.list(USER).await))
}

fn first_todo(session: &BoardSession) -> Task {
    session
        .board()
        .read(|board| board.lane(&Category::ToDo)[0].clone())
}

#[tokio::test]
async fn move_across_lanes_is_persisted() {
    let (base_url, state) = start_server().await;
    let (session, controller) = open(&base_url).await;
    let task = first_todo(&session);
    let done = session
        .board()
        .read(|board| board.lane(&Category::Done)[0].id.clone());

    let handle = controller
        .commit_move(&DragEnd::new(task.id.clone(), done.as_str()))
        .expect("move should be planned");
    // Optimistic: already on the board before the store answers.
    assert_eq!(
        session.board().read(|board| board.find(&task.id).unwrap().category.clone()),
        Category::Done
    );
    handle.await.unwrap().unwrap();

    let board = session.board().snapshot();
    assert_eq!(board.lane(&Category::Done)[1].id, task.id);
    assert_eq!(layout(&board), store_layout(&state).await);
    assert_eq!(session.notices().transient(), None);
}

#[tokio::test]
async fn reorder_within_lane_is_persisted() {
    let (base_url, state) = start_server().await;
    let (session, controller) = open(&base_url).await;
    let (top, bottom) = session.board().read(|board| {
        let lane = board.lane(&Category::ToDo);
        (lane[0].id.clone(), lane[1].id.clone())
    });

    controller
        .commit_move(&DragEnd::new(top.clone(), bottom.as_str()))
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    let todo: Vec<TaskId> = session
        .board()
        .read(|board| board.lane(&Category::ToDo).iter().map(|t| t.id.clone()).collect());
    assert_eq!(todo, vec![bottom, top]);
    assert_eq!(layout(&session.board().snapshot()), store_layout(&state).await);
}

#[tokio::test]
async fn drop_on_lane_label_appends() {
    let (base_url, state) = start_server().await;
    let (session, controller) = open(&base_url).await;
    let task = first_todo(&session);

    controller
        .commit_move(&DragEnd::new(task.id.clone(), "In Progress"))
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    let lane = session.board().read(|board| board.lane(&Category::InProgress).to_vec());
    assert_eq!(lane.last().unwrap().id, task.id);
    assert_eq!(lane.last().unwrap().order as usize, lane.len() - 1);
    assert_eq!(layout(&session.board().snapshot()), store_layout(&state).await);
}

#[tokio::test]
async fn move_of_task_gone_from_store_rolls_back() {
    let (base_url, state) = start_server().await;
    let (session, controller) = open(&base_url).await;
    let before = session.board().snapshot();
    let task = first_todo(&session);
    state.store.delete(&task.id).await.unwrap();

    let err = controller
        .commit_move(&DragEnd::new(task.id.clone(), "Done"))
        .unwrap()
        .await
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Sync(SyncError::Conflict(_))));
    assert_eq!(session.board().snapshot(), before);
    assert_eq!(session.notices().transient().as_deref(), Some(MOVE_FAILED));
}

#[tokio::test]
async fn unreachable_store_rolls_back() {
    let (base_url, _state) = start_server().await;
    let session = BoardSession::start(USER, http(&base_url).as_ref(), BoardSettings::default())
        .await
        .unwrap();
    let before = session.board().snapshot();
    let controller = ReconciliationController::new(&session, http("http://127.0.0.1:1"));

    let task = first_todo(&session);
    let err = controller
        .commit_move(&DragEnd::new(task.id, "Done"))
        .unwrap()
        .await
        .unwrap()
        .unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::Sync(SyncError::Transport(_) | SyncError::Timeout)
    ));
    assert_eq!(session.board().snapshot(), before);
    assert_eq!(session.notices().transient().as_deref(), Some(MOVE_FAILED));
}

#[tokio::test]
async fn create_edit_delete_round_trip() {
    let (base_url, state) = start_server().await;
    let (session, controller) = open(&base_url).await;

    let Delivery::Confirmed(task) = controller
        .commit_create(
            TaskDraft::new("  Review  ")
                .with_description("second pass")
                .in_category(Category::InProgress),
        )
        .await
        .unwrap()
    else {
        panic!("request mode should confirm");
    };
    assert_eq!(task.title, "Review");
    assert_eq!(session.board().read(|board| board.find(&task.id).cloned()), Some(task.clone()));

    let mut buffer = EditBuffer::open(&task);
    buffer.title = "Review again".to_string();
    let outcome = controller.commit_edit(&mut buffer).await.unwrap();
    assert!(matches!(outcome, EditOutcome::Saved(Delivery::Confirmed(_))));
    assert!(!buffer.is_dirty());
    let stored = state.store.list(USER).await;
    let saved = stored.iter().find(|t| t.id == task.id).unwrap();
    assert_eq!(saved.title, "Review again");
    assert_eq!(saved.category, Category::InProgress);

    controller
        .commit_delete(&task.id, &|_: &Task| true)
        .await
        .unwrap();
    assert!(session.board().read(|board| board.find(&task.id).is_none()));
    assert!(state.store.list(USER).await.iter().all(|t| t.id != task.id));
}

#[tokio::test]
async fn edit_of_task_deleted_elsewhere_resets_buffer() {
    let (base_url, state) = start_server().await;
    let (session, controller) = open(&base_url).await;
    let task = first_todo(&session);
    state.store.delete(&task.id).await.unwrap();

    let mut buffer = EditBuffer::open(&task);
    buffer.title = "Too late".to_string();
    let err = controller.commit_edit(&mut buffer).await.unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::Sync(SyncError::Status { status: 404, .. })
    ));
    assert_eq!(buffer.title, task.title);
    assert!(
        session
            .notices()
            .transient()
            .unwrap()
            .starts_with("Failed to update task:")
    );
}
