//! Reconciliation controller: optimistic moves and confirmed edits.
//!
//! Moves are applied to the board before the persist call is made and
//! rolled back wholesale (snapshot restore) if it fails. Creates, edits and
//! deletes are not optimistic: the board only changes once the store has
//! confirmed, or, in push mode, when the router applies the echo.
//!
//! Outstanding persist calls are neither queued nor cancelled. Every staged
//! move carries a [`MoveToken`]; a failure arriving after a newer move was
//! staged still restores its own snapshot, and is logged as superseded.
//!
//! In push mode a move's outcome arrives later, as the echo of its reorder
//! or as a rejection. Such moves wait in [`PendingMoves`] until the change
//! router resolves them; a rejected one is rolled back like a failed call.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use kanban_proto::api::{CreateTaskRequest, UpdateTaskRequest};
use kanban_proto::change::{Change, ReorderEntry};
use kanban_proto::task::{Category, Task, TaskId};
use parking_lot::Mutex;
use thiserror::Error;

use crate::board::Board;
use crate::config::BoardSettings;
use crate::drag::DragEnd;
use crate::notice::Notices;
use crate::planner::{MovePlan, plan_move};
use crate::session::{BoardHandle, BoardSession};
use crate::sync::{Delivery, SyncClient, SyncError, SyncMode};

/// Message shown when a move could not be persisted.
pub const MOVE_FAILED: &str = "Failed to save task order. Please try again.";

/// A task field that failed local validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The title is empty after trimming.
    #[error("title is required")]
    TitleEmpty,
    /// The title is longer than allowed.
    #[error("title must be at most {max} characters")]
    TitleTooLong {
        /// Allowed length in characters.
        max: usize,
    },
    /// The description is longer than allowed.
    #[error("description must be at most {max} characters")]
    DescriptionTooLong {
        /// Allowed length in characters.
        max: usize,
    },
}

/// Why a controller operation did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// Rejected locally, nothing was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The store or transport failed.
    #[error(transparent)]
    Sync(#[from] SyncError),
    /// The task is not on the board.
    #[error("task {0} not found")]
    NotFound(TaskId),
    /// The user declined the confirmation.
    #[error("cancelled")]
    Cancelled,
}

/// Validates a title and description against `settings`.
///
/// Returns the trimmed title on success. Lengths are counted in characters.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn validate(
    title: &str,
    description: &str,
    settings: &BoardSettings,
) -> Result<String, ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::TitleEmpty);
    }
    if title.chars().count() > settings.max_title_len {
        return Err(ValidationError::TitleTooLong {
            max: settings.max_title_len,
        });
    }
    if description.chars().count() > settings.max_description_len {
        return Err(ValidationError::DescriptionTooLong {
            max: settings.max_description_len,
        });
    }
    Ok(title.to_string())
}

/// Identifies one staged move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MoveToken(u64);

impl fmt::Display for MoveToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "move#{}", self.0)
    }
}

/// A move that has been applied to the board but not yet persisted.
#[derive(Debug, Clone)]
pub struct StagedMove {
    token: MoveToken,
    plan: MovePlan,
    snapshot: Board,
}

impl StagedMove {
    /// Token of this move.
    #[must_use]
    pub const fn token(&self) -> MoveToken {
        self.token
    }

    /// The plan that was applied.
    #[must_use]
    pub const fn plan(&self) -> &MovePlan {
        &self.plan
    }

    /// The board as it was before the move.
    #[must_use]
    pub const fn snapshot(&self) -> &Board {
        &self.snapshot
    }
}

/// Moves dispatched over the push channel whose outcome has not arrived.
///
/// The server answers one channel's intents in order, so the oldest entry
/// is the move the next own reorder echo or reorder rejection refers to.
/// Clones share the queue.
#[derive(Debug, Clone, Default)]
pub struct PendingMoves {
    queue: Arc<Mutex<VecDeque<StagedMove>>>,
}

impl PendingMoves {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of moves awaiting an outcome.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether no move is awaiting an outcome.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Tokens of the waiting moves, oldest first.
    #[must_use]
    pub fn tokens(&self) -> Vec<MoveToken> {
        self.queue.lock().iter().map(StagedMove::token).collect()
    }

    fn track(&self, staged: StagedMove) {
        self.queue.lock().push_back(staged);
    }

    fn forget(&self, token: MoveToken) -> bool {
        let mut queue = self.queue.lock();
        let before = queue.len();
        queue.retain(|staged| staged.token != token);
        queue.len() != before
    }

    /// Resolve the oldest move if `entries` is its reorder echoed back.
    pub fn confirm(&self, entries: &[ReorderEntry]) -> Option<MoveToken> {
        let mut queue = self.queue.lock();
        if queue.front()?.plan.entries != entries {
            return None;
        }
        queue.pop_front().map(|staged| staged.token)
    }

    /// Take the oldest move, whose reorder the server refused.
    pub fn reject_oldest(&self) -> Option<StagedMove> {
        self.queue.lock().pop_front()
    }

    /// Drop every waiting move. Returns how many there were.
    pub fn clear(&self) -> usize {
        let mut queue = self.queue.lock();
        let count = queue.len();
        queue.clear();
        count
    }
}

/// Input for [`ReconciliationController::commit_create`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    /// Task title.
    pub title: String,
    /// Task description.
    pub description: String,
    /// Lane for the new task.
    pub category: Category,
}

impl TaskDraft {
    /// A draft for the To-Do lane with no description.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the lane.
    #[must_use]
    pub fn in_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }
}

/// Asks the user whether a task may be deleted.
pub trait ConfirmDelete: Send + Sync {
    /// Returns `true` to go ahead.
    fn confirm(&self, task: &Task) -> bool;
}

impl<F> ConfirmDelete for F
where
    F: Fn(&Task) -> bool + Send + Sync,
{
    fn confirm(&self, task: &Task) -> bool {
        self(task)
    }
}

/// Edit state of one task: the working values and the last committed ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBuffer {
    task_id: TaskId,
    /// Title being edited.
    pub title: String,
    /// Description being edited.
    pub description: String,
    committed_title: String,
    committed_description: String,
}

impl EditBuffer {
    /// Start editing `task`.
    #[must_use]
    pub fn open(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            committed_title: task.title.clone(),
            committed_description: task.description.clone(),
        }
    }

    /// The task being edited.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Whether a working value differs from its committed value.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.title != self.committed_title || self.description != self.committed_description
    }

    /// Throw away the working values.
    pub fn reset(&mut self) {
        self.title.clone_from(&self.committed_title);
        self.description.clone_from(&self.committed_description);
    }

    fn commit(&mut self, title: String) {
        self.title.clone_from(&title);
        self.committed_title = title;
        self.committed_description.clone_from(&self.description);
    }
}

/// Outcome of [`ReconciliationController::commit_edit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// Nothing differed, nothing was sent.
    Unchanged,
    /// The update went out.
    Saved(Delivery<Task>),
}

/// Turns user intents into board changes and persist calls.
///
/// Cheap to clone; clones share the sync client, board and notices.
pub struct ReconciliationController<S> {
    sync: Arc<S>,
    user_id: Arc<str>,
    board: BoardHandle,
    notices: Notices,
    settings: BoardSettings,
    pending: PendingMoves,
    next_token: Arc<AtomicU64>,
    latest_token: Arc<AtomicU64>,
}

impl<S> Clone for ReconciliationController<S> {
    fn clone(&self) -> Self {
        Self {
            sync: Arc::clone(&self.sync),
            user_id: Arc::clone(&self.user_id),
            board: self.board.clone(),
            notices: self.notices.clone(),
            settings: self.settings.clone(),
            pending: self.pending.clone(),
            next_token: Arc::clone(&self.next_token),
            latest_token: Arc::clone(&self.latest_token),
        }
    }
}

impl<S: SyncClient> ReconciliationController<S> {
    /// Controller for `session`, persisting through `sync`.
    #[must_use]
    pub fn new(session: &BoardSession, sync: Arc<S>) -> Self {
        Self {
            sync,
            user_id: Arc::from(session.user_id()),
            board: session.board().clone(),
            notices: session.notices().clone(),
            settings: session.settings().clone(),
            pending: session.pending_moves().clone(),
            next_token: Arc::new(AtomicU64::new(1)),
            latest_token: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The sync client.
    #[must_use]
    pub fn sync(&self) -> &S {
        &self.sync
    }

    /// Moves dispatched in push mode and still awaiting their outcome.
    #[must_use]
    pub const fn pending_moves(&self) -> &PendingMoves {
        &self.pending
    }

    /// Plan a drag and apply it to the board.
    ///
    /// Snapshot, plan and apply happen under one board lock, so no other
    /// write can land between them. Returns `None` when the drag is a
    /// no-op; the board is untouched.
    pub fn stage_move(&self, drag: &DragEnd) -> Option<StagedMove> {
        let staged = self.board.write(|board| {
            let plan = plan_move(board, drag)?;
            let snapshot = board.clone();
            board.apply(&plan.change());
            let token = MoveToken(self.next_token.fetch_add(1, Ordering::Relaxed));
            self.latest_token.store(token.0, Ordering::Relaxed);
            Some(StagedMove {
                token,
                plan,
                snapshot,
            })
        })?;
        tracing::debug!(
            token = %staged.token,
            task_id = %staged.plan.task_id,
            source = %staged.plan.source,
            destination = %staged.plan.destination,
            "move staged"
        );
        Some(staged)
    }

    /// Persist a staged move, rolling the board back if that fails.
    ///
    /// A move dispatched over the push channel is left in
    /// [`PendingMoves`]; the router rolls it back if the server refuses it.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Sync`] after restoring the snapshot.
    pub async fn finish_move(&self, staged: StagedMove) -> Result<(), ReconcileError> {
        // The answer to a pushed intent can arrive before `reorder` returns.
        let tracked = self.sync.mode() == SyncMode::Push;
        if tracked {
            self.pending.track(staged.clone());
        }

        match self.sync.reorder(&self.user_id, &staged.plan.entries).await {
            Ok(Delivery::Dispatched) => {
                tracing::debug!(token = %staged.token, "move dispatched, awaiting echo");
                if !tracked {
                    self.pending.track(staged);
                }
                self.notices.clear_transient();
                Ok(())
            }
            Ok(Delivery::Confirmed(())) => {
                if tracked {
                    self.pending.forget(staged.token);
                }
                tracing::debug!(token = %staged.token, "move persisted");
                self.notices.clear_transient();
                Ok(())
            }
            Err(err) => {
                if tracked {
                    self.pending.forget(staged.token);
                }
                let latest = self.latest_token.load(Ordering::Relaxed);
                if latest != staged.token.0 {
                    tracing::warn!(
                        token = %staged.token,
                        latest = %MoveToken(latest),
                        err = %err,
                        "superseded move failed, rolling back to its snapshot"
                    );
                } else {
                    tracing::warn!(token = %staged.token, err = %err, "move failed, rolling back");
                }
                self.board.restore(staged.snapshot);
                self.notices.flash(MOVE_FAILED, self.settings.notice_ttl);
                Err(err.into())
            }
        }
    }

    /// Apply and persist a drag.
    ///
    /// The board reflects the move when this returns. The persist call runs
    /// on a spawned task whose handle is returned; `None` means the drag
    /// was a no-op and nothing was sent.
    pub fn commit_move(
        &self,
        drag: &DragEnd,
    ) -> Option<tokio::task::JoinHandle<Result<(), ReconcileError>>>
    where
        S: 'static,
    {
        let staged = self.stage_move(drag)?;
        let controller = self.clone();
        Some(tokio::spawn(async move { controller.finish_move(staged).await }))
    }

    /// Create a task from `draft`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Validation`] without contacting the store,
    /// or [`ReconcileError::Sync`] if the store refuses.
    pub async fn commit_create(&self, draft: TaskDraft) -> Result<Delivery<Task>, ReconcileError> {
        let title = validate(&draft.title, &draft.description, &self.settings)?;
        let request = CreateTaskRequest {
            title,
            description: draft.description,
            category: draft.category,
            user_id: self.user_id.to_string(),
        };

        match self.sync.create(request).await {
            Ok(delivery) => {
                if let Delivery::Confirmed(task) = &delivery {
                    tracing::info!(task_id = %task.id, category = %task.category, "task added");
                    self.board.apply(&Change::Create { task: task.clone() });
                }
                self.notices.clear_transient();
                Ok(delivery)
            }
            Err(err) => {
                self.notices
                    .flash(format!("Failed to add task: {err}"), self.settings.notice_ttl);
                Err(err.into())
            }
        }
    }

    /// Delete a task after asking `confirm`.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::NotFound`] if the task is not on the board.
    /// - [`ReconcileError::Cancelled`] if the user declined.
    /// - [`ReconcileError::Sync`] if the store refuses.
    pub async fn commit_delete(
        &self,
        id: &TaskId,
        confirm: &impl ConfirmDelete,
    ) -> Result<Delivery<()>, ReconcileError> {
        let task = self
            .board
            .read(|board| board.find(id).cloned())
            .ok_or_else(|| ReconcileError::NotFound(id.clone()))?;
        if !confirm.confirm(&task) {
            tracing::debug!(task_id = %id, "delete cancelled");
            return Err(ReconcileError::Cancelled);
        }

        match self.sync.delete(id).await {
            Ok(delivery) => {
                if matches!(delivery, Delivery::Confirmed(())) {
                    self.board.apply(&Change::Delete {
                        task_id: id.clone(),
                    });
                }
                self.notices.clear_transient();
                Ok(delivery)
            }
            Err(err) => {
                self.notices
                    .flash(format!("Failed to delete task: {err}"), self.settings.notice_ttl);
                Err(err.into())
            }
        }
    }

    /// Save an edit.
    ///
    /// The update keeps the task's current lane and position. The buffer is
    /// committed once the store confirms; a dispatched edit leaves it open
    /// until [`ReconciliationController::acknowledge_edit`] sees the echo.
    /// On a store failure the buffer is reset to its last committed values.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::NotFound`] if the task left the board.
    /// - [`ReconcileError::Validation`] if the working values are invalid.
    /// - [`ReconcileError::Sync`] if the store refuses.
    pub async fn commit_edit(&self, buffer: &mut EditBuffer) -> Result<EditOutcome, ReconcileError> {
        if !buffer.is_dirty() {
            return Ok(EditOutcome::Unchanged);
        }
        let (category, order) = self
            .board
            .read(|board| {
                board
                    .find(&buffer.task_id)
                    .map(|task| (task.category.clone(), task.order))
            })
            .ok_or_else(|| ReconcileError::NotFound(buffer.task_id.clone()))?;
        let title = validate(&buffer.title, &buffer.description, &self.settings)?;

        let request = UpdateTaskRequest {
            title: title.clone(),
            description: buffer.description.clone(),
            category,
            order,
        };
        match self.sync.update(&buffer.task_id, request).await {
            Ok(delivery) => {
                if let Delivery::Confirmed(task) = &delivery {
                    self.board.apply(&Change::Update { task: task.clone() });
                    buffer.commit(title);
                } else {
                    tracing::debug!(task_id = %buffer.task_id, "edit dispatched, awaiting echo");
                }
                self.notices.clear_transient();
                Ok(EditOutcome::Saved(delivery))
            }
            Err(err) => {
                tracing::warn!(task_id = %buffer.task_id, err = %err, "edit failed");
                buffer.reset();
                self.notices
                    .flash(format!("Failed to update task: {err}"), self.settings.notice_ttl);
                Err(err.into())
            }
        }
    }

    /// Commit `buffer` if the board now shows its working values, as it
    /// does once the echo of a dispatched edit has been applied.
    ///
    /// Returns whether the buffer was committed.
    pub fn acknowledge_edit(&self, buffer: &mut EditBuffer) -> bool {
        let title = buffer.title.trim().to_string();
        let saved = self.board.read(|board| {
            board
                .find(&buffer.task_id)
                .is_some_and(|task| task.title == title && task.description == buffer.description)
        });
        if saved {
            buffer.commit(title);
        }
        saved
    }
}
