//! Kanban reference server library.
//!
//! An in-memory task store exposed over REST and a WebSocket push channel.
//! Exposed as a library for integration tests and embedding.

pub mod api;
pub mod channel;
pub mod config;
pub mod server;
pub mod store;
