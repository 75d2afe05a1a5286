//! Sync client abstraction over the two remote transports.
//!
//! Defines the [`SyncClient`] trait that every transport implements.
//! Concrete implementations include:
//! - [`http::HttpSyncClient`]: request/response over HTTP; responses are authoritative
//! - [`channel::ChannelSyncClient`]: push channel over WebSocket; intents are fire-and-forget
//! - [`hybrid::HybridSyncClient`]: prefers the push channel while connected, else request/response
//! - [`memory::MemorySyncClient`]: in-process remote store for tests and offline use

pub mod channel;
pub mod http;
pub mod hybrid;
pub mod memory;

use std::fmt;
use std::future::Future;

use kanban_proto::api::{CreateTaskRequest, UpdateTaskRequest};
use kanban_proto::change::{Change, ReorderEntry};
use kanban_proto::task::{Task, TaskId};

/// Which kind of transport carried an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Fire-and-forget intents on the push channel.
    Push,
    /// One round trip per operation.
    Request,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Request => write!(f, "request"),
        }
    }
}

/// How a successful operation was delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery<T> {
    /// The remote store answered with its authoritative result.
    Confirmed(T),
    /// The intent was emitted; its result arrives as a notification.
    Dispatched,
}

impl<T> Delivery<T> {
    /// Returns the confirmed value, if any.
    pub fn confirmed(self) -> Option<T> {
        match self {
            Self::Confirmed(value) => Some(value),
            Self::Dispatched => None,
        }
    }
}

/// Errors that can occur while talking to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The remote store could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// The operation timed out before completing.
    #[error("request timed out")]
    Timeout,

    /// The remote store answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Reason reported by the server.
        message: String,
    },

    /// The remote store rejected the operation against its current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The response could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The push channel is not connected.
    #[error("push channel not connected")]
    NotConnected,

    /// A channel frame could not be encoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl SyncError {
    /// Returns `true` if the remote store rejected the operation
    /// (as opposed to the operation never reaching it).
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<kanban_proto::channel::CodecError> for SyncError {
    fn from(err: kanban_proto::channel::CodecError) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Connection lifecycle of the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The channel is open and joined.
    Connected,
    /// The channel failed.
    ConnectionError(String),
    /// The channel closed.
    Disconnected,
    /// A reconnect attempt is about to start.
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Attempts allowed before giving up.
        max_attempts: u32,
    },
    /// Every reconnect attempt failed; the channel stays closed.
    ReconnectFailed,
}

/// Something that arrived from the remote side without being asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A change to the board, made by this or another client.
    Change(Change),
    /// The push channel changed state.
    Connection(ConnectionEvent),
    /// The server rejected a fire-and-forget intent.
    Rejected {
        /// Event name of the rejected intent, when the server named it.
        event: Option<String>,
        /// Reason given by the server.
        reason: String,
    },
}

/// Persists board mutations to the remote store.
///
/// All four operations are available in both modes. In request/response
/// mode they resolve to [`Delivery::Confirmed`] with the store's answer; in
/// push mode they resolve to [`Delivery::Dispatched`] as soon as the intent
/// is on the wire, and the outcome arrives through a [`NotificationSource`].
pub trait SyncClient: Send + Sync {
    /// Create a task. The store assigns its id and order.
    fn create(
        &self,
        request: CreateTaskRequest,
    ) -> impl Future<Output = Result<Delivery<Task>, SyncError>> + Send;

    /// Replace a task's editable fields.
    fn update(
        &self,
        id: &TaskId,
        request: UpdateTaskRequest,
    ) -> impl Future<Output = Result<Delivery<Task>, SyncError>> + Send;

    /// Remove a task.
    fn delete(&self, id: &TaskId) -> impl Future<Output = Result<Delivery<()>, SyncError>> + Send;

    /// Persist a lane/position reassignment.
    fn reorder(
        &self,
        user_id: &str,
        tasks: &[ReorderEntry],
    ) -> impl Future<Output = Result<Delivery<()>, SyncError>> + Send;

    /// Whether this client can currently carry operations.
    fn is_connected(&self) -> bool;

    /// The mode the next operation would use.
    fn mode(&self) -> SyncMode;
}

/// Bulk-loads a user's tasks.
pub trait BoardSource: Send + Sync {
    /// Fetch every task owned by `user_id`.
    fn fetch_all(&self, user_id: &str)
    -> impl Future<Output = Result<Vec<Task>, SyncError>> + Send;
}

/// Stream of inbound notifications.
pub trait NotificationSource: Send + Sync {
    /// Wait for the next event. Returns `None` once the source is closed.
    fn next_event(&self) -> impl Future<Output = Option<SyncEvent>> + Send;
}

/// The remote client used against a real task store.
pub type RemoteSyncClient = hybrid::HybridSyncClient<channel::ChannelSyncClient, http::HttpSyncClient>;

/// Build the remote client described by `config`.
///
/// The push channel is opened when `config` resolves a channel URL. If it
/// cannot be opened the client runs on request/response alone; callers can
/// tell from [`hybrid::HybridSyncClient::preferred`].
///
/// # Errors
///
/// Returns [`SyncError::Transport`] if no base URL is configured or it is
/// not a valid URL.
pub async fn connect(config: &crate::config::ClientConfig) -> Result<RemoteSyncClient, SyncError> {
    let base_url = config
        .base_url
        .as_deref()
        .ok_or_else(|| SyncError::Transport("no base URL configured".to_string()))?;
    let http = http::HttpSyncClient::new(base_url, config.sync.request_timeout)?;

    let push = match config.resolved_channel_url() {
        Some(url) => {
            let options = channel::ChannelOptions {
                connect_timeout: config.sync.connect_timeout,
                join_timeout: config.sync.join_timeout,
                capacity: config.sync.channel_capacity,
                reconnect: channel::ReconnectPolicy {
                    initial_delay: config.sync.reconnect_initial_delay,
                    max_delay: config.sync.reconnect_max_delay,
                    max_attempts: config.sync.reconnect_attempts,
                },
            };
            match channel::ChannelSyncClient::connect(&url, &config.user_id, options).await {
                Ok(client) => Some(client),
                Err(e) => {
                    tracing::warn!(url = %url, err = %e, "push channel unavailable, using request/response");
                    None
                }
            }
        }
        None => None,
    };

    Ok(hybrid::HybridSyncClient::new(push, http))
}
