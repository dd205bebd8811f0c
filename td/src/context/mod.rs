//! Task-scoped wrapper around `contextstore::ContextStore` plus the
//! inheritance resolver that seeds a fresh context from a previous run's
//! final summary.

mod bridge;
mod inheritance;

pub use bridge::ContextBridge;
pub use inheritance::{resolve_inheritance, InheritanceCandidate};
