//! Server core: shared state, change fan-out and startup.
//!
//! Every mutation, whether it came in over REST or over the push channel,
//! goes through [`AppState`], which writes it to the [`TaskStore`] and
//! broadcasts the resulting `taskChange` to every channel joined under the
//! owning user.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use kanban_proto::api::{CreateTaskRequest, UpdateTaskRequest};
use kanban_proto::change::{Change, ReorderEntry};
use kanban_proto::channel::{self, ServerMessage};
use kanban_proto::task::{Category, Task, TaskId};
use tokio::sync::{RwLock, mpsc};

use crate::store::{StoreError, TaskStore};

/// A joined push channel.
struct Subscriber {
    id: u64,
    sender: mpsc::UnboundedSender<Message>,
}

/// Shared server state: the task store and the joined channels per user.
pub struct AppState {
    /// The task store.
    pub store: TaskStore,
    channels: RwLock<HashMap<String, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Creates a state with an empty store and no channels.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: TaskStore::new(),
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a channel under `user_id`. Returns its subscription id.
    pub async fn join(&self, user_id: &str, sender: mpsc::UnboundedSender<Message>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.channels
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(Subscriber { id, sender });
        id
    }

    /// Removes a channel. Returns `true` if it was joined.
    pub async fn leave(&self, user_id: &str, id: u64) -> bool {
        let mut channels = self.channels.write().await;
        let Some(subscribers) = channels.get_mut(user_id) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        let removed = subscribers.len() != before;
        if subscribers.is_empty() {
            channels.remove(user_id);
        }
        removed
    }

    /// Number of channels joined under `user_id`.
    pub async fn channel_count(&self, user_id: &str) -> usize {
        self.channels.read().await.get(user_id).map_or(0, Vec::len)
    }

    /// Sends `change` to every channel joined under `user_id`.
    /// Returns how many channels it was handed to.
    pub async fn broadcast(&self, user_id: &str, change: Change) -> usize {
        let kind = change.kind();
        let text = match channel::encode(&ServerMessage::TaskChange(change)) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode task change");
                return 0;
            }
        };

        let channels = self.channels.read().await;
        let delivered = channels.get(user_id).map_or(0, |subscribers| {
            subscribers
                .iter()
                .filter(|s| s.sender.send(Message::Text(text.clone().into())).is_ok())
                .count()
        });
        drop(channels);
        tracing::debug!(user_id, kind, delivered, "broadcast task change");
        delivered
    }

    /// Send a Close frame to every joined channel.
    pub async fn close_all_connections(&self) {
        let channels = self.channels.read().await;
        for (user_id, subscribers) in channels.iter() {
            tracing::info!(user_id = %user_id, count = subscribers.len(), "closing channels");
            for subscriber in subscribers {
                let _ = subscriber.sender.send(Message::Close(None));
            }
        }
    }

    /// Create a task and announce it.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] of the store.
    pub async fn create_task(&self, request: CreateTaskRequest) -> Result<Task, StoreError> {
        let owner = request.user_id.clone();
        let task = self.store.create(request).await?;
        tracing::info!(user_id = %owner, task_id = %task.id, "task created");
        self.broadcast(&owner, Change::Create { task: task.clone() })
            .await;
        Ok(task)
    }

    /// Update a task and announce it.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] of the store.
    pub async fn update_task(
        &self,
        id: &TaskId,
        request: UpdateTaskRequest,
    ) -> Result<Task, StoreError> {
        let (owner, task) = self.store.update(id, request).await?;
        self.broadcast(&owner, Change::Update { task: task.clone() })
            .await;
        Ok(task)
    }

    /// Delete a task and announce it.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] of the store.
    pub async fn delete_task(&self, id: &TaskId) -> Result<(), StoreError> {
        let owner = self.store.delete(id).await?;
        tracing::info!(user_id = %owner, task_id = %id, "task deleted");
        self.broadcast(&owner, Change::Delete { task_id: id.clone() })
            .await;
        Ok(())
    }

    /// Reorder tasks and announce the new placement.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] of the store.
    pub async fn reorder_tasks(
        &self,
        user_id: &str,
        entries: Vec<ReorderEntry>,
    ) -> Result<(), StoreError> {
        self.store.reorder(user_id, &entries).await?;
        tracing::debug!(user_id, count = entries.len(), "tasks reordered");
        self.broadcast(user_id, Change::Reorder { tasks: entries })
            .await;
        Ok(())
    }

    /// Fill `user_id`'s board with a few demo tasks. Returns how many were
    /// created.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] of the store.
    pub async fn seed_demo(&self, user_id: &str) -> Result<usize, StoreError> {
        const DEMO: [(&str, &str, Category); 4] = [
            ("Write the README", "Usage and configuration", Category::ToDo),
            ("Sketch lanes", "", Category::ToDo),
            ("Wire the push channel", "Join, intents, taskChange", Category::InProgress),
            ("Set up the repo", "", Category::Done),
        ];
        for (title, description, category) in DEMO {
            self.store
                .create(CreateTaskRequest {
                    title: title.to_string(),
                    description: description.to_string(),
                    category,
                    user_id: user_id.to_string(),
                })
                .await?;
        }
        tracing::info!(user_id, count = DEMO.len(), "seeded demo tasks");
        Ok(DEMO.len())
    }
}

/// Builds the router: the REST endpoints plus the push channel at `/ws`.
pub fn router(state: Arc<AppState>) -> axum::Router {
    use axum::routing::{get, post, put};

    axum::Router::new()
        .route("/tasks", post(crate::api::create_task))
        .route(
            "/tasks/{id}",
            get(crate::api::list_tasks)
                .put(crate::api::update_task)
                .delete(crate::api::delete_task),
        )
        .route("/tasks/reorder/{user_id}", put(crate::api::reorder_tasks))
        .route("/ws", get(crate::channel::ws_handler))
        .with_state(state)
}

/// Starts the server on the given address and returns the bound address
/// and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(AppState::new())).await
}

/// Starts the server with a pre-built [`AppState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<AppState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}
