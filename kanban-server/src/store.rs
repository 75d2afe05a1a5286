//! In-memory task store.
//!
//! The [`TaskStore`] keeps every user's tasks behind a [`RwLock`]. It
//! assigns ids and `order = lane length` on create and applies reorders
//! verbatim; it does not re-densify, clients do that themselves.

use std::collections::HashMap;

use chrono::Utc;
use kanban_proto::api::{CreateTaskRequest, UpdateTaskRequest};
use kanban_proto::change::ReorderEntry;
use kanban_proto::task::{MAX_TASK_DESCRIPTION_LENGTH, MAX_TASK_TITLE_LENGTH, Task, TaskId};
use tokio::sync::RwLock;

/// Errors returned by [`TaskStore`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The request body is invalid.
    #[error("{0}")]
    Invalid(String),
    /// No task has this id.
    #[error("task {0} not found")]
    NotFound(TaskId),
    /// A reorder named a task the user does not own.
    #[error("task {0} not found")]
    UnknownTask(TaskId),
}

#[derive(Debug, Clone)]
struct Owned {
    owner: String,
    task: Task,
}

/// Thread-safe in-memory task store.
pub struct TaskStore {
    tasks: RwLock<HashMap<TaskId, Owned>>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Every task of `user_id`, sorted by lane then order.
    pub async fn list(&self, user_id: &str) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut list: Vec<Task> = tasks
            .values()
            .filter(|owned| owned.owner == user_id)
            .map(|owned| owned.task.clone())
            .collect();
        drop(tasks);
        list.sort_by(|a, b| a.category.cmp(&b.category).then(a.order.cmp(&b.order)));
        list
    }

    /// Creates a task at the end of its lane.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for a blank title, a missing user or
    /// oversized fields.
    pub async fn create(&self, request: CreateTaskRequest) -> Result<Task, StoreError> {
        let title = check_fields(&request.title, &request.description)?;
        if request.user_id.is_empty() {
            return Err(StoreError::Invalid("userId is required".to_string()));
        }

        let mut tasks = self.tasks.write().await;
        let lane_len = tasks
            .values()
            .filter(|o| o.owner == request.user_id && o.task.category == request.category)
            .count();
        let now = Utc::now();
        let mut task = Task::new(
            uuid::Uuid::now_v7().to_string(),
            title,
            request.category,
            u32::try_from(lane_len).unwrap_or(u32::MAX),
        )
        .with_description(request.description);
        task.created_at = Some(now);
        task.updated_at = Some(now);

        tasks.insert(
            task.id.clone(),
            Owned {
                owner: request.user_id,
                task: task.clone(),
            },
        );
        Ok(task)
    }

    /// Replaces a task's editable fields. Returns the owner and the task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id and
    /// [`StoreError::Invalid`] for invalid fields.
    pub async fn update(
        &self,
        id: &TaskId,
        request: UpdateTaskRequest,
    ) -> Result<(String, Task), StoreError> {
        let title = check_fields(&request.title, &request.description)?;
        let mut tasks = self.tasks.write().await;
        let owned = tasks
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        owned.task.title = title;
        owned.task.description = request.description;
        owned.task.category = request.category;
        owned.task.order = request.order;
        owned.task.updated_at = Some(Utc::now());
        Ok((owned.owner.clone(), owned.task.clone()))
    }

    /// Removes a task. Returns its owner.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id.
    pub async fn delete(&self, id: &TaskId) -> Result<String, StoreError> {
        self.tasks
            .write()
            .await
            .remove(id)
            .map(|owned| owned.owner)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// Applies a reorder atomically: either every entry is applied or none.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownTask`] if an entry names a task that
    /// `user_id` does not own.
    pub async fn reorder(&self, user_id: &str, entries: &[ReorderEntry]) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        if let Some(missing) = entries
            .iter()
            .find(|e| tasks.get(&e.id).is_none_or(|o| o.owner != user_id))
        {
            return Err(StoreError::UnknownTask(missing.id.clone()));
        }

        let now = Utc::now();
        for entry in entries {
            if let Some(owned) = tasks.get_mut(&entry.id) {
                owned.task.category = entry.category.clone();
                owned.task.order = entry.order;
                owned.task.updated_at = Some(now);
            }
        }
        Ok(())
    }
}

/// Validates title and description, returning the trimmed title.
fn check_fields(title: &str, description: &str) -> Result<String, StoreError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StoreError::Invalid("title is required".to_string()));
    }
    if title.chars().count() > MAX_TASK_TITLE_LENGTH {
        return Err(StoreError::Invalid(format!(
            "title must be at most {MAX_TASK_TITLE_LENGTH} characters"
        )));
    }
    if description.chars().count() > MAX_TASK_DESCRIPTION_LENGTH {
        return Err(StoreError::Invalid(format!(
            "description must be at most {MAX_TASK_DESCRIPTION_LENGTH} characters"
        )));
    }
    Ok(title.to_string())
}
