//! Container lifecycle and scoped command/file-edit execution.

mod manager;

pub use manager::{CommandOutput, ContainerRecord, ContainerStatus, EditorCommand, EnvironmentError, EnvironmentManager};
