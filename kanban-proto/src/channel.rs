//! Push-channel protocol.
//!
//! Messages travel as WebSocket text frames holding JSON objects of the
//! form `{"event": "<name>", "data": <payload>}`. The client announces its
//! session with `join`, emits fire-and-forget intents (`taskCreate`,
//! `taskReorder`, `taskUpdate`, `taskDelete`), and receives `taskChange`
//! notifications carrying a [`Change`]. A refused intent is answered with
//! `error`, naming the intent's event so the client can tell which of its
//! outstanding intents failed.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::CreateTaskRequest;
use crate::change::{Change, ReorderEntry};
use crate::task::{Category, TaskId};

/// Error type for channel encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("channel codec error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Event name of the `taskReorder` intent.
pub const TASK_REORDER: &str = "taskReorder";

/// Messages sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Announce the user session. Must be the first message on a channel.
    Join {
        /// The user whose board this channel follows.
        user_id: String,
    },
    /// Create a task.
    TaskCreate(CreateTaskRequest),
    /// Persist a new lane/position assignment.
    TaskReorder {
        /// Owner of the tasks.
        user_id: String,
        /// New placement of every affected task.
        tasks: Vec<ReorderEntry>,
    },
    /// Replace a task's editable fields.
    TaskUpdate {
        /// Task being edited.
        id: TaskId,
        /// New title.
        title: String,
        /// New description.
        description: String,
        /// Lane of the task.
        category: Category,
        /// Position of the task.
        order: u32,
    },
    /// Remove a task.
    TaskDelete {
        /// Task being removed.
        id: TaskId,
    },
}

impl ClientMessage {
    /// Event name of this message, for logging.
    #[must_use]
    pub const fn event(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::TaskCreate(_) => "taskCreate",
            Self::TaskReorder { .. } => TASK_REORDER,
            Self::TaskUpdate { .. } => "taskUpdate",
            Self::TaskDelete { .. } => "taskDelete",
        }
    }
}

/// Messages sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Acknowledges a `join`.
    Joined {
        /// The user echoed back.
        user_id: String,
    },
    /// A change to the user's board, from any client or transport.
    TaskChange(Change),
    /// The server rejected an intent.
    ///
    /// Intents on one channel are answered in the order they were sent.
    Error {
        /// Human-readable reason.
        reason: String,
        /// Event name of the rejected intent. Absent when the frame could
        /// not be decoded at all.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<String>,
    },
}

/// Encodes a channel message as a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the message cannot be serialized.
pub fn encode<T: Serialize>(msg: &T) -> Result<String, CodecError> {
    Ok(serde_json::to_string(msg)?)
}

/// Decodes a channel message from a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the text is not a valid message.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    Ok(serde_json::from_str(text)?)
}
