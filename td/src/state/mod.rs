//! State management with actor pattern.
//!
//! `StateManager` owns the task index `Store<TaskRecord>` and processes
//! commands via channels, providing thread-safe access from the producer,
//! consumer, and coordinator.

mod manager;
mod messages;

pub use manager::{StateEvent, StateManager};
pub use messages::{StateCommand, StateError, StateResponse, TaskQuery};
