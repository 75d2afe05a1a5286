//! In-memory board: tasks partitioned into ordered lanes.
//!
//! The [`Board`] is only ever mutated through [`Board::apply`], which takes
//! a [`Change`] and is total (it never fails). After every change the lanes
//! it touched are sorted by `order` and re-densified to `0..n-1`; the remote
//! store does not guarantee dense orders, so the board does it itself.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use kanban_proto::change::Change;
use kanban_proto::task::{Category, Task, TaskId};
use thiserror::Error;

/// A broken board invariant, reported by [`Board::check_invariants`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    /// The same task id appears more than once.
    #[error("task {0} appears in more than one position")]
    DuplicateId(TaskId),
    /// A lane's orders are not `0..n-1` in sequence order.
    #[error("lane {category} has order {order} at position {position}")]
    NotDense {
        /// Offending lane.
        category: Category,
        /// Sequence position of the offending task.
        position: usize,
        /// The order value found there.
        order: u32,
    },
    /// A task sits in a lane other than the one its `category` names.
    #[error("task {id} is stored in lane {lane} but claims {category}")]
    WrongLane {
        /// Offending task.
        id: TaskId,
        /// Lane the task is stored in.
        lane: Category,
        /// Lane the task's own field names.
        category: Category,
    },
}

/// Tasks partitioned by category, each lane ordered by `order`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    lanes: BTreeMap<Category, Vec<Task>>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// Creates an empty board with the three default lanes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lanes: Category::DEFAULT_LANES
                .into_iter()
                .map(|category| (category, Vec::new()))
                .collect(),
        }
    }

    /// Builds a board from a flat task list, as returned by the remote store.
    ///
    /// Tasks are partitioned by category, sorted by `order`, and every lane
    /// is re-densified. A repeated id keeps its last occurrence.
    #[must_use]
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut board = Self::new();
        let mut touched = BTreeSet::new();
        for task in tasks {
            if let Some((old_lane, _)) = board.remove_everywhere(&task.id) {
                touched.insert(old_lane);
            }
            touched.insert(task.category.clone());
            board.lane_mut(&task.category).push(task);
        }
        for category in &touched {
            board.normalize(category);
        }
        board
    }

    /// Applies a change. Replaying the same change yields the same board.
    pub fn apply(&mut self, change: &Change) {
        tracing::trace!(kind = change.kind(), "applying change");
        match change {
            Change::Create { task } | Change::Update { task } => {
                let old_lane = self.remove_everywhere(&task.id).map(|(lane, _)| lane);
                self.lane_mut(&task.category).push(task.clone());
                self.normalize(&task.category);
                if let Some(old_lane) = old_lane
                    && old_lane != task.category
                {
                    self.normalize(&old_lane);
                }
            }
            Change::Delete { task_id } => {
                if let Some((lane, _)) = self.remove_everywhere(task_id) {
                    self.normalize(&lane);
                }
            }
            Change::Reorder { tasks } => {
                let mut touched = BTreeSet::new();
                for entry in tasks {
                    let Some((old_lane, mut task)) = self.remove_everywhere(&entry.id) else {
                        tracing::debug!(task_id = %entry.id, "reorder entry for unknown task, skipping");
                        continue;
                    };
                    task.category = entry.category.clone();
                    task.order = entry.order;
                    touched.insert(old_lane);
                    touched.insert(entry.category.clone());
                    self.lane_mut(&entry.category).push(task);
                }
                for category in &touched {
                    self.normalize(category);
                }
            }
        }
    }

    /// Returns a copy of this board with `change` applied.
    #[must_use]
    pub fn applied(&self, change: &Change) -> Self {
        let mut next = self.clone();
        next.apply(change);
        next
    }

    /// Returns the tasks of a lane in order. Unknown lanes are empty.
    #[must_use]
    pub fn lane(&self, category: &Category) -> &[Task] {
        self.lanes.get(category).map_or(&[], Vec::as_slice)
    }

    /// Iterates over all lanes in board order.
    pub fn lanes(&self) -> impl Iterator<Item = (&Category, &[Task])> {
        self.lanes
            .iter()
            .map(|(category, tasks)| (category, tasks.as_slice()))
    }

    /// Finds a task by id, searching every lane.
    #[must_use]
    pub fn find(&self, id: &TaskId) -> Option<&Task> {
        self.lanes
            .values()
            .flat_map(|tasks| tasks.iter())
            .find(|task| &task.id == id)
    }

    /// Returns the lane and position of a task.
    #[must_use]
    pub fn locate(&self, id: &TaskId) -> Option<(&Category, usize)> {
        self.lanes.iter().find_map(|(category, tasks)| {
            tasks
                .iter()
                .position(|task| &task.id == id)
                .map(|index| (category, index))
        })
    }

    /// Total number of tasks on the board.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lanes.values().map(Vec::len).sum()
    }

    /// Returns `true` if no lane holds a task.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.values().all(Vec::is_empty)
    }

    /// Drops every task and custom lane.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Verifies the board invariants: unique ids, tasks stored in the lane
    /// they name, and dense ascending orders starting at 0.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvariantViolation`] found.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut seen = HashSet::new();
        for (lane, tasks) in &self.lanes {
            for (position, task) in tasks.iter().enumerate() {
                if !seen.insert(&task.id) {
                    return Err(InvariantViolation::DuplicateId(task.id.clone()));
                }
                if &task.category != lane {
                    return Err(InvariantViolation::WrongLane {
                        id: task.id.clone(),
                        lane: lane.clone(),
                        category: task.category.clone(),
                    });
                }
                if task.order != dense_order(position) {
                    return Err(InvariantViolation::NotDense {
                        category: lane.clone(),
                        position,
                        order: task.order,
                    });
                }
            }
        }
        Ok(())
    }

    fn lane_mut(&mut self, category: &Category) -> &mut Vec<Task> {
        self.lanes.entry(category.clone()).or_default()
    }

    /// Removes a task from whichever lane holds it.
    fn remove_everywhere(&mut self, id: &TaskId) -> Option<(Category, Task)> {
        let mut found = None;
        for (category, tasks) in &mut self.lanes {
            if let Some(index) = tasks.iter().position(|task| &task.id == id) {
                let task = tasks.remove(index);
                if found.is_none() {
                    found = Some((category.clone(), task));
                }
            }
        }
        found
    }

    /// Stable-sorts a lane by `order` and rewrites orders to positions.
    fn normalize(&mut self, category: &Category) {
        if let Some(tasks) = self.lanes.get_mut(category) {
            tasks.sort_by_key(|task| task.order);
            densify(tasks);
        }
    }
}

/// Rewrites `order` to match sequence position.
pub(crate) fn densify(tasks: &mut [Task]) {
    for (position, task) in tasks.iter_mut().enumerate() {
        task.order = dense_order(position);
    }
}

/// Order value for a sequence position.
pub(crate) fn dense_order(position: usize) -> u32 {
    u32::try_from(position).unwrap_or(u32::MAX)
}
