//! Request and response bodies of the REST endpoints.
//!
//! | Method | Path                      | Body                  | Response          |
//! |--------|---------------------------|-----------------------|-------------------|
//! | GET    | `/tasks/{user_id}`        |                       | `[Task]`          |
//! | POST   | `/tasks`                  | [`CreateTaskRequest`] | `Task`            |
//! | PUT    | `/tasks/{id}`             | [`UpdateTaskRequest`] | `Task`            |
//! | DELETE | `/tasks/{id}`             |                       | no body           |
//! | PUT    | `/tasks/reorder/{user_id}`| [`ReorderRequest`]    | [`ReorderResponse`] |
//!
//! Failures carry an [`ErrorBody`].

use serde::{Deserialize, Serialize};

use crate::change::ReorderEntry;
use crate::task::Category;

/// Body of `POST /tasks` and of the `taskCreate` channel intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    /// Title of the new task.
    pub title: String,
    /// Description of the new task.
    #[serde(default)]
    pub description: String,
    /// Lane the task is created in.
    #[serde(default)]
    pub category: Category,
    /// Owner of the task.
    pub user_id: String,
}

/// Body of `PUT /tasks/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    /// New title.
    pub title: String,
    /// New description.
    #[serde(default)]
    pub description: String,
    /// Lane of the task (unchanged by an edit).
    pub category: Category,
    /// Position of the task (unchanged by an edit).
    pub order: u32,
}

/// Body of `PUT /tasks/reorder/{user_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderRequest {
    /// New placement of every task in the affected lanes.
    pub tasks: Vec<ReorderEntry>,
}

/// Response of `PUT /tasks/reorder/{user_id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderResponse {
    /// Whether the store accepted the new order.
    pub success: bool,
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason.
    pub error: String,
}

impl ErrorBody {
    /// Creates an error body.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
