//! Kanban board engine: the board model, move planning, remote sync and
//! reconciliation of optimistic moves.

pub mod board;
pub mod config;
pub mod drag;
pub mod notice;
pub mod planner;
pub mod reconcile;
pub mod render;
pub mod router;
pub mod session;
pub mod sync;
