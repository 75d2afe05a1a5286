//! In-process remote store.
//!
//! [`MemorySyncClient`] keeps tasks in memory and behaves like the real
//! store: it assigns ids and orders, rejects reorders naming unknown tasks,
//! and reports unknown ids on update and delete. In [`SyncMode::Push`] it
//! mimics the push channel by answering every intent with a notification
//! instead of a result. Failures and latency can be scripted, which makes it
//! the workhorse of the reconciliation tests and the offline CLI.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kanban_proto::api::{CreateTaskRequest, UpdateTaskRequest};
use kanban_proto::change::{Change, ReorderEntry};
use kanban_proto::channel::TASK_REORDER;
use kanban_proto::task::{Category, Task, TaskId};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{
    BoardSource, ConnectionEvent, Delivery, NotificationSource, SyncClient, SyncError, SyncEvent,
    SyncMode,
};

#[derive(Debug, Clone)]
struct StoredTask {
    owner: String,
    task: Task,
}

#[derive(Debug, Default)]
struct State {
    tasks: Vec<StoredTask>,
    failures: VecDeque<SyncError>,
    offline: bool,
    latency: Option<Duration>,
    calls: Vec<&'static str>,
}

/// Shareable in-memory store. Clones share state.
#[derive(Clone)]
pub struct MemorySyncClient {
    state: Arc<Mutex<State>>,
    mode: SyncMode,
    events_tx: mpsc::UnboundedSender<SyncEvent>,
    events_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<SyncEvent>>>,
}

impl Default for MemorySyncClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySyncClient {
    /// Empty store answering in request/response mode.
    #[must_use]
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(State::default())),
            mode: SyncMode::Request,
            events_tx,
            events_rx: Arc::new(tokio::sync::Mutex::new(events_rx)),
        }
    }

    /// Empty store answering in push mode. Queues `Connected` first.
    #[must_use]
    pub fn push() -> Self {
        let client = Self {
            mode: SyncMode::Push,
            ..Self::new()
        };
        client.notify(SyncEvent::Connection(ConnectionEvent::Connected));
        client
    }

    /// Store pre-filled with `tasks` owned by `owner`.
    #[must_use]
    pub fn seeded(owner: &str, tasks: impl IntoIterator<Item = Task>) -> Self {
        let client = Self::new();
        client.state.lock().tasks.extend(tasks.into_iter().map(|task| StoredTask {
            owner: owner.to_string(),
            task,
        }));
        client
    }

    /// A handle onto the same store answering in `mode`.
    ///
    /// Notifications are shared, so a push view and a request view of one
    /// store observe the same event stream.
    #[must_use]
    pub fn with_mode(&self, mode: SyncMode) -> Self {
        Self {
            mode,
            ..self.clone()
        }
    }

    /// Make the next operation fail with `err` without touching the store.
    pub fn fail_next(&self, err: SyncError) {
        self.state.lock().failures.push_back(err);
    }

    /// Take the store offline (or back online). Offline operations fail
    /// with [`SyncError::NotConnected`]. In push mode the change is also
    /// announced as a connection event.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
        if self.mode == SyncMode::Push {
            let event = if offline {
                ConnectionEvent::Disconnected
            } else {
                ConnectionEvent::Connected
            };
            self.notify(SyncEvent::Connection(event));
        }
    }

    /// Delay every operation by `latency` before it reaches the store.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = Some(latency);
    }

    /// Names of the operations received so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    /// Every task owned by `owner`, sorted by lane and order.
    #[must_use]
    pub fn tasks(&self, owner: &str) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .state
            .lock()
            .tasks
            .iter()
            .filter(|stored| stored.owner == owner)
            .map(|stored| stored.task.clone())
            .collect();
        tasks.sort_by(|a, b| a.category.cmp(&b.category).then(a.order.cmp(&b.order)));
        tasks
    }

    /// Deliver a change as if another client had made it.
    pub fn inject(&self, change: Change) {
        self.notify(SyncEvent::Change(change));
    }

    /// Queue an arbitrary event for [`NotificationSource::next_event`].
    pub fn notify(&self, event: SyncEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Record the call and apply scripted latency and failures.
    async fn enter(&self, op: &'static str) -> Result<(), SyncError> {
        let latency = {
            let mut state = self.state.lock();
            state.calls.push(op);
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        if let Some(err) = state.failures.pop_front() {
            tracing::debug!(op, err = %err, "scripted failure");
            return Err(err);
        }
        if state.offline {
            return Err(SyncError::NotConnected);
        }
        Ok(())
    }

    /// Turn a store result into the delivery for this mode. `event` names
    /// the intent in push-mode rejections, as the push channel does.
    fn deliver<T>(
        &self,
        event: &'static str,
        result: Result<(T, Change), SyncError>,
    ) -> Result<Delivery<T>, SyncError> {
        match (self.mode, result) {
            (SyncMode::Request, Ok((value, _))) => Ok(Delivery::Confirmed(value)),
            (SyncMode::Request, Err(err)) => Err(err),
            (SyncMode::Push, Ok((_, change))) => {
                self.notify(SyncEvent::Change(change));
                Ok(Delivery::Dispatched)
            }
            (SyncMode::Push, Err(err)) => {
                self.notify(SyncEvent::Rejected {
                    event: Some(event.to_string()),
                    reason: err.to_string(),
                });
                Ok(Delivery::Dispatched)
            }
        }
    }

    fn store_create(&self, request: CreateTaskRequest) -> Result<(Task, Change), SyncError> {
        if request.title.trim().is_empty() {
            return Err(SyncError::Status {
                status: 400,
                message: "title is required".to_string(),
            });
        }
        let mut state = self.state.lock();
        let order = state
            .tasks
            .iter()
            .filter(|s| s.owner == request.user_id && s.task.category == request.category)
            .count();
        let now = Utc::now();
        let mut task = Task::new(
            uuid::Uuid::now_v7().to_string(),
            request.title,
            request.category,
            u32::try_from(order).unwrap_or(u32::MAX),
        )
        .with_description(request.description);
        task.created_at = Some(now);
        task.updated_at = Some(now);
        state.tasks.push(StoredTask {
            owner: request.user_id,
            task: task.clone(),
        });
        Ok((task.clone(), Change::Create { task }))
    }

    fn store_update(
        &self,
        id: &TaskId,
        request: UpdateTaskRequest,
    ) -> Result<(Task, Change), SyncError> {
        let mut state = self.state.lock();
        let stored = state
            .tasks
            .iter_mut()
            .find(|s| &s.task.id == id)
            .ok_or_else(|| not_found(id))?;
        stored.task.title = request.title;
        stored.task.description = request.description;
        stored.task.category = request.category;
        stored.task.order = request.order;
        stored.task.updated_at = Some(Utc::now());
        let task = stored.task.clone();
        Ok((task.clone(), Change::Update { task }))
    }

    fn store_delete(&self, id: &TaskId) -> Result<((), Change), SyncError> {
        let mut state = self.state.lock();
        let before = state.tasks.len();
        state.tasks.retain(|s| &s.task.id != id);
        if state.tasks.len() == before {
            return Err(not_found(id));
        }
        Ok((
            (),
            Change::Delete {
                task_id: id.clone(),
            },
        ))
    }

    fn store_reorder(
        &self,
        user_id: &str,
        entries: &[ReorderEntry],
    ) -> Result<((), Change), SyncError> {
        let mut state = self.state.lock();
        if let Some(missing) = entries.iter().find(|entry| {
            !state
                .tasks
                .iter()
                .any(|s| s.owner == user_id && s.task.id == entry.id)
        }) {
            return Err(SyncError::Conflict(format!("task {} not found", missing.id)));
        }
        let now = Utc::now();
        for entry in entries {
            if let Some(stored) = state.tasks.iter_mut().find(|s| s.task.id == entry.id) {
                stored.task.category = entry.category.clone();
                stored.task.order = entry.order;
                stored.task.updated_at = Some(now);
            }
        }
        Ok((
            (),
            Change::Reorder {
                tasks: entries.to_vec(),
            },
        ))
    }
}

fn not_found(id: &TaskId) -> SyncError {
    SyncError::Status {
        status: 404,
        message: format!("task {id} not found"),
    }
}

impl SyncClient for MemorySyncClient {
    async fn create(&self, request: CreateTaskRequest) -> Result<Delivery<Task>, SyncError> {
        self.enter("create").await?;
        self.deliver("taskCreate", self.store_create(request))
    }

    async fn update(
        &self,
        id: &TaskId,
        request: UpdateTaskRequest,
    ) -> Result<Delivery<Task>, SyncError> {
        self.enter("update").await?;
        self.deliver("taskUpdate", self.store_update(id, request))
    }

    async fn delete(&self, id: &TaskId) -> Result<Delivery<()>, SyncError> {
        self.enter("delete").await?;
        self.deliver("taskDelete", self.store_delete(id))
    }

    async fn reorder(
        &self,
        user_id: &str,
        tasks: &[ReorderEntry],
    ) -> Result<Delivery<()>, SyncError> {
        self.enter("reorder").await?;
        self.deliver(TASK_REORDER, self.store_reorder(user_id, tasks))
    }

    fn is_connected(&self) -> bool {
        !self.state.lock().offline
    }

    fn mode(&self) -> SyncMode {
        self.mode
    }
}

impl BoardSource for MemorySyncClient {
    async fn fetch_all(&self, user_id: &str) -> Result<Vec<Task>, SyncError> {
        self.enter("fetch_all").await?;
        Ok(self.tasks(user_id))
    }
}

impl NotificationSource for MemorySyncClient {
    async fn next_event(&self) -> Option<SyncEvent> {
        self.events_rx.lock().await.recv().await
    }
}

/// Demo board used when no remote store is configured.
#[must_use]
pub fn demo_tasks() -> Vec<Task> {
    vec![
        Task::new("demo-1", "Sketch the board layout", Category::Done, 0),
        Task::new("demo-2", "Wire up drag and drop", Category::InProgress, 0)
            .with_description("Lanes accept drops on cards and on lane labels"),
        Task::new("demo-3", "Persist new orders", Category::InProgress, 1),
        Task::new("demo-4", "Write release notes", Category::ToDo, 0),
    ]
}
