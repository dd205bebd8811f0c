//! Progress-comment rendering: the markdown checklist a task's tracker
//! comment is edited in place to show, per phase transition.

mod renderer;

pub use renderer::{ChecklistItem, HistoryEntry, ProgressComment};
