//! Shared wire definitions for the kanban client and server.

pub mod api;
pub mod change;
pub mod channel;
pub mod task;
