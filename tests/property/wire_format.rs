//! Property tests for the wire format.
//!
//! Uses proptest to verify:
//! 1. Arbitrary text never makes the channel decoder panic.
//! 2. Any `Change` survives a trip through a `taskChange` frame.
//! 3. Any lane label survives a JSON trip, and built-in labels map to
//!    built-in lanes.

#![allow(clippy::unwrap_used)]

use kanban_proto::change::{Change, ReorderEntry};
use kanban_proto::channel::{self, ServerMessage};
use kanban_proto::task::{Category, Task, TaskId};
use proptest::prelude::*;

fn arb_category() -> impl Strategy<Value = Category> {
    prop_oneof![
        Just(Category::ToDo),
        Just(Category::InProgress),
        Just(Category::Done),
        "[A-Za-z ]{1,16}".prop_map(|label| Category::from_label(&label)),
    ]
}

fn arb_task() -> impl Strategy<Value = Task> {
    (
        "[a-f0-9]{1,24}",
        "[^\x00]{1,50}",
        "[^\x00]{0,200}",
        arb_category(),
        0u32..1000,
    )
        .prop_map(|(id, title, description, category, order)| {
            Task::new(TaskId::new(id), title, category, order).with_description(description)
        })
}

fn arb_change() -> impl Strategy<Value = Change> {
    prop_oneof![
        arb_task().prop_map(|task| Change::Create { task }),
        arb_task().prop_map(|task| Change::Update { task }),
        "[a-f0-9]{1,24}".prop_map(|id| Change::Delete {
            task_id: TaskId::new(id)
        }),
        prop::collection::vec(
            ("[a-f0-9]{1,24}", arb_category(), 0u32..100)
                .prop_map(|(id, category, order)| ReorderEntry::new(id, category, order)),
            0..12,
        )
        .prop_map(|tasks| Change::Reorder { tasks }),
    ]
}

proptest! {
    #[test]
    fn decode_never_panics(text in ".{0,256}") {
        let _ = channel::decode::<ServerMessage>(&text);
    }

    #[test]
    fn task_change_frames_carry_changes_intact(change in arb_change()) {
        let frame = channel::encode(&ServerMessage::TaskChange(change.clone())).unwrap();
        let decoded: ServerMessage = channel::decode(&frame).unwrap();
        prop_assert_eq!(decoded, ServerMessage::TaskChange(change));
    }

    #[test]
    fn lane_labels_are_stable(category in arb_category()) {
        let json = serde_json::to_string(&category).unwrap();
        let back: Category = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(&back, &category);
        prop_assert_eq!(Category::from_label(category.label()), category);
    }
}
