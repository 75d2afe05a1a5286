//! Move planning: turns a finished drag into a lane/position reassignment.
//!
//! [`plan_move`] is pure. It never touches the board it is given; it
//! returns the [`MovePlan`] the caller applies optimistically and persists.
//! Only the source and destination lanes are reassigned.

use kanban_proto::change::{Change, ReorderEntry};
use kanban_proto::task::{Category, Task, TaskId};

use crate::board::{Board, densify};
use crate::drag::DragEnd;

/// The outcome of planning a drag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    /// The dragged task.
    pub task_id: TaskId,
    /// Lane the task was dragged from.
    pub source: Category,
    /// Lane the task was dropped into.
    pub destination: Category,
    /// New placement of every task in the source and destination lanes,
    /// source lane first.
    pub entries: Vec<ReorderEntry>,
}

impl MovePlan {
    /// The `Reorder` change that realizes this plan.
    #[must_use]
    pub fn change(&self) -> Change {
        Change::Reorder {
            tasks: self.entries.clone(),
        }
    }

    /// Returns `true` if the task changes lanes.
    #[must_use]
    pub fn is_cross_lane(&self) -> bool {
        self.source != self.destination
    }
}

/// Plans the reassignment for a finished drag.
///
/// Returns `None` when there is nothing to do: the drag ended outside any
/// drop target, the dragged task is not on the board, or the task was
/// dropped on itself without changing lanes.
///
/// Insertion rules:
/// - same lane, dropped on a task: the hovered task's index is taken after
///   the dragged task is lifted out; moving down lands at that index (just
///   before the hovered task), moving up lands right after it;
/// - other lane, dropped on a task: right after the hovered task;
/// - dropped on a lane label: appended to that lane.
#[must_use]
pub fn plan_move(board: &Board, drag: &DragEnd) -> Option<MovePlan> {
    let over_id = drag.over.as_deref()?;
    let (source, active_index) = board
        .locate(&drag.active)
        .map(|(category, index)| (category.clone(), index))?;

    let over_task = board.find(&TaskId::new(over_id));
    let destination =
        over_task.map_or_else(|| Category::from_label(over_id), |task| task.category.clone());

    if drag.active.as_str() == over_id && source == destination {
        tracing::trace!(task_id = %drag.active, "dropped on itself, nothing to move");
        return None;
    }

    let mut source_list: Vec<Task> = board.lane(&source).to_vec();
    let mut moved = source_list.remove(active_index);
    moved.category = destination.clone();

    let same_lane = source == destination;
    let mut dest_list: Vec<Task> = if same_lane {
        Vec::new()
    } else {
        board.lane(&destination).to_vec()
    };

    let target = if same_lane {
        &mut source_list
    } else {
        &mut dest_list
    };

    let insert_at = match over_task {
        Some(over) => {
            // Index among the tasks left after the dragged one is lifted out.
            let over_index = target.iter().position(|task| task.id == over.id)?;
            if same_lane && over_index > active_index {
                over_index
            } else {
                over_index + 1
            }
        }
        None => target.len(),
    };
    target.insert(insert_at.min(target.len()), moved);

    densify(&mut source_list);
    densify(&mut dest_list);

    let entries = source_list
        .iter()
        .chain(dest_list.iter())
        .map(|task| ReorderEntry::new(task.id.clone(), task.category.clone(), task.order))
        .collect();

    tracing::debug!(
        task_id = %drag.active,
        source = %source,
        destination = %destination,
        insert_at,
        "planned move"
    );

    Some(MovePlan {
        task_id: drag.active.clone(),
        source,
        destination,
        entries,
    })
}
