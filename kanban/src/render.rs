//! Plain-text rendering of the board and the notice area.

use std::fmt::Write as _;

use crate::board::Board;
use crate::notice::Notices;

/// Banner shown while the push channel is down.
pub const DEGRADED_BANNER: &str = "Live updates unavailable. Changes are saved on request only.";

/// Render every lane with its tasks, in lane order.
///
/// ```text
/// To-Do (2)
///   [a1] Write docs
///        Usage and configuration
///   [a2] Sketch lanes
/// In Progress (0)
///   (empty)
/// ```
#[must_use]
pub fn board(board: &Board) -> String {
    let mut out = String::new();
    for (category, tasks) in board.lanes() {
        let _ = writeln!(out, "{category} ({})", tasks.len());
        if tasks.is_empty() {
            out.push_str("  (empty)\n");
        }
        for task in tasks {
            let _ = writeln!(out, "  [{}] {}", task.id, task.title);
            if !task.description.is_empty() {
                let indent = task.id.as_str().chars().count() + 5;
                let _ = writeln!(out, "{:indent$}{}", "", task.description);
            }
        }
    }
    out
}

/// Lines for the notice area: the degraded banner, then the transient
/// message. Empty when nothing is showing.
#[must_use]
pub fn notices(notices: &Notices) -> Vec<String> {
    let mut lines = Vec::new();
    if notices.is_degraded() {
        lines.push(format!("~ {DEGRADED_BANNER}"));
    }
    if let Some(message) = notices.transient() {
        lines.push(format!("! {message}"));
    }
    lines
}

/// The board followed by the notice area.
#[must_use]
pub fn screen(board: &Board, notices: &Notices) -> String {
    let mut out = self::board(board);
    let lines = self::notices(notices);
    if !lines.is_empty() {
        out.push('\n');
        for line in lines {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}
