//! Capability surface of the external drag/drop provider.
//!
//! The gesture recognizer is not part of this crate. It reports the start
//! of a drag with the dragged task id and the end of a drag with the drop
//! target id, which is either another task or a bare lane label (a drop
//! on an empty lane or on the lane background).

use kanban_proto::task::TaskId;

use crate::board::Board;

/// The end of a drag gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragEnd {
    /// The dragged task.
    pub active: TaskId,
    /// What it was dropped on: a task id, a lane label, or nothing.
    pub over: Option<String>,
}

impl DragEnd {
    /// Creates a drag end dropped on `over`.
    pub fn new(active: impl Into<TaskId>, over: impl Into<String>) -> Self {
        Self {
            active: active.into(),
            over: Some(over.into()),
        }
    }

    /// Creates a drag end that was released outside any drop target.
    pub fn outside(active: impl Into<TaskId>) -> Self {
        Self {
            active: active.into(),
            over: None,
        }
    }
}

/// Tracks the drag in progress between `on_drag_start` and `on_drag_end`.
#[derive(Debug, Default)]
pub struct DragTracker {
    active: Option<TaskId>,
}

impl DragTracker {
    /// Creates a tracker with no drag in progress.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the start of a drag.
    pub fn on_drag_start(&mut self, id: TaskId) {
        tracing::trace!(task_id = %id, "drag started");
        self.active = Some(id);
    }

    /// Records the end of a drag and returns the event to plan from.
    pub fn on_drag_end(&mut self, active: TaskId, over: Option<String>) -> DragEnd {
        self.active = None;
        DragEnd { active, over }
    }

    /// Abandons the drag in progress.
    pub fn cancel(&mut self) {
        self.active = None;
    }

    /// The task currently being dragged.
    #[must_use]
    pub const fn active(&self) -> Option<&TaskId> {
        self.active.as_ref()
    }

    /// Title of the dragged task, for a drag overlay.
    #[must_use]
    pub fn overlay_title<'a>(&self, board: &'a Board) -> Option<&'a str> {
        let id = self.active.as_ref()?;
        board.find(id).map(|task| task.title.as_str())
    }
}
