//! Task model shared by the kanban client and server.
//!
//! A [`Task`] lives in exactly one [`Category`] (lane) and carries an
//! `order` giving its position inside that lane. Categories serialize as
//! the human-readable lane labels used on the wire (`"To-Do"`,
//! `"In Progress"`, `"Done"`); any other label is carried verbatim.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 50;

/// Maximum allowed task description length in characters.
pub const MAX_TASK_DESCRIPTION_LENGTH: usize = 200;

/// Opaque task identifier assigned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a task identifier from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of this identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A lane of the board.
///
/// The three built-in lanes sort first, in board order; unknown labels
/// sort after them alphabetically.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(from = "String", into = "String")]
pub enum Category {
    /// Work not yet started.
    #[default]
    ToDo,
    /// Work in progress.
    InProgress,
    /// Finished work.
    Done,
    /// Any lane label the client does not know about.
    Other(String),
}

impl Category {
    /// The built-in lanes every board starts with.
    pub const DEFAULT_LANES: [Self; 3] = [Self::ToDo, Self::InProgress, Self::Done];

    /// Returns the wire label of this category.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::ToDo => "To-Do",
            Self::InProgress => "In Progress",
            Self::Done => "Done",
            Self::Other(label) => label,
        }
    }

    /// Parses a wire label. Never fails: unknown labels become [`Category::Other`].
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            "To-Do" => Self::ToDo,
            "In Progress" => Self::InProgress,
            "Done" => Self::Done,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        Self::from_label(&value)
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        match value {
            Category::Other(label) => label,
            builtin => builtin.label().to_string(),
        }
    }
}

/// A task on the board, as stored by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier (server-assigned).
    #[serde(alias = "_id")]
    pub id: TaskId,
    /// Short title, at most [`MAX_TASK_TITLE_LENGTH`] characters.
    pub title: String,
    /// Optional longer description (empty when absent).
    #[serde(default)]
    pub description: String,
    /// The lane this task belongs to.
    pub category: Category,
    /// Position inside the lane.
    #[serde(default)]
    pub order: u32,
    /// Creation time, display only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time, display only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a task without timestamps.
    pub fn new(
        id: impl Into<TaskId>,
        title: impl Into<String>,
        category: Category,
        order: u32,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            category,
            order,
            created_at: None,
            updated_at: None,
        }
    }

    /// Returns a copy of this task with a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
