//! Board mutations as they travel between client and server.
//!
//! A [`Change`] is the only way a board is mutated, whether the change
//! originated locally (an optimistic move) or remotely (a `taskChange`
//! notification on the push channel).

use serde::{Deserialize, Serialize};

use crate::task::{Category, Task, TaskId};

/// New lane and position for one task in a reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderEntry {
    /// Task being placed.
    #[serde(alias = "_id")]
    pub id: TaskId,
    /// Lane the task ends up in.
    pub category: Category,
    /// Position inside that lane.
    pub order: u32,
}

impl ReorderEntry {
    /// Creates a reorder entry.
    pub fn new(id: impl Into<TaskId>, category: Category, order: u32) -> Self {
        Self {
            id: id.into(),
            category,
            order,
        }
    }
}

/// A board mutation.
///
/// Serialized with a `type` tag, matching the `taskChange` notification
/// payload: `{"type":"delete","taskId":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Change {
    /// A task was created.
    Create {
        /// The authoritative task.
        task: Task,
    },
    /// A task's fields changed.
    Update {
        /// The authoritative task after the update.
        task: Task,
    },
    /// A task was removed.
    Delete {
        /// Identifier of the removed task.
        #[serde(rename = "taskId")]
        task_id: TaskId,
    },
    /// Tasks were moved between or within lanes.
    Reorder {
        /// New placement of every affected task.
        tasks: Vec<ReorderEntry>,
    },
}

impl Change {
    /// Short name of the variant, for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Reorder { .. } => "reorder",
        }
    }
}
