//! Property tests for the board model and the move planner.
//!
//! Uses proptest to verify:
//! 1. Any sequence of changes leaves the board's invariants intact.
//! 2. Applying a change twice is the same as applying it once.
//! 3. A planned move keeps every task on the board, lands the dragged task
//!    in the destination lane, and leaves other lanes alone.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use kanban::board::Board;
use kanban::drag::DragEnd;
use kanban::planner::plan_move;
use kanban_proto::change::{Change, ReorderEntry};
use kanban_proto::task::{Category, Task, TaskId};
use proptest::prelude::*;

/// A small id space so creates, updates and deletes collide often.
fn arb_id() -> impl Strategy<Value = TaskId> {
    (0u8..8).prop_map(|n| TaskId::new(format!("t{n}")))
}

fn arb_category() -> impl Strategy<Value = Category> {
    prop_oneof![
        4 => Just(Category::ToDo),
        4 => Just(Category::InProgress),
        4 => Just(Category::Done),
        1 => Just(Category::Other("Blocked".to_string())),
    ]
}

fn arb_task() -> impl Strategy<Value = Task> {
    (arb_id(), "[a-z]{1,12}", arb_category(), 0u32..20)
        .prop_map(|(id, title, category, order)| Task::new(id, title, category, order))
}

fn arb_change() -> impl Strategy<Value = Change> {
    prop_oneof![
        arb_task().prop_map(|task| Change::Create { task }),
        arb_task().prop_map(|task| Change::Update { task }),
        arb_id().prop_map(|task_id| Change::Delete { task_id }),
        prop::collection::vec(
            (arb_id(), arb_category(), 0u32..20)
                .prop_map(|(id, category, order)| ReorderEntry::new(id, category, order)),
            0..6,
        )
        .prop_map(|tasks| Change::Reorder { tasks }),
    ]
}

fn arb_board() -> impl Strategy<Value = Board> {
    prop::collection::vec(arb_change(), 0..24).prop_map(|changes| {
        let mut board = Board::new();
        for change in &changes {
            board.apply(change);
        }
        board
    })
}

fn ids(board: &Board) -> Vec<TaskId> {
    let mut ids: Vec<TaskId> = board
        .lanes()
        .flat_map(|(_, tasks)| tasks.iter().map(|task| task.id.clone()))
        .collect();
    ids.sort();
    ids
}

proptest! {
    #[test]
    fn changes_preserve_invariants(changes in prop::collection::vec(arb_change(), 0..40)) {
        let mut board = Board::new();
        for change in &changes {
            board.apply(change);
            prop_assert_eq!(board.check_invariants(), Ok(()));
        }
    }

    #[test]
    fn changes_are_idempotent(board in arb_board(), change in arb_change()) {
        let once = board.applied(&change);
        let twice = once.applied(&change);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn from_tasks_is_valid(tasks in prop::collection::vec(arb_task(), 0..16)) {
        let board = Board::from_tasks(tasks);
        prop_assert_eq!(board.check_invariants(), Ok(()));
    }

    #[test]
    fn planned_moves_keep_every_task(
        board in arb_board(),
        active in arb_id(),
        over_task in arb_id(),
        over_lane in arb_category(),
        onto_lane in any::<bool>(),
    ) {
        let over = if onto_lane {
            over_lane.label().to_string()
        } else {
            over_task.as_str().to_string()
        };
        let Some(plan) = plan_move(&board, &DragEnd::new(active.clone(), over)) else {
            return Ok(());
        };

        let moved = board.applied(&plan.change());
        prop_assert_eq!(moved.check_invariants(), Ok(()));
        prop_assert_eq!(ids(&moved), ids(&board));
        prop_assert_eq!(&moved.find(&active).unwrap().category, &plan.destination);

        for (category, tasks) in board.lanes() {
            if category != &plan.source && category != &plan.destination {
                prop_assert_eq!(moved.lane(category), tasks);
            }
        }
    }
}
