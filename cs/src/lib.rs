//! ContextStore - durable, append-only per-task conversation context.
//!
//! Each autonomous task gets one context directory holding the full audit
//! log of every message (`messages.jsonl`), the active LLM-facing transcript
//! (`current.jsonl`), token-pressure-triggered summaries, a tool-call log,
//! and the planning event log. See [`store`] for the directory layout and
//! the compression algorithm.
//!
//! # Example
//!
//! ```ignore
//! use contextstore::{ContextStore, TaskMetadata};
//!
//! let store = ContextStore::create("running/<uuid>", metadata)?;
//! store.append_message("user", "Fix the failing test", None)?;
//! if store.should_compress(200_000, 0.7)? {
//!     if let Some(plan) = store.plan_compression(8, 5)? {
//!         let summary = summarize(&plan.to_summarize_text);
//!         store.apply_compression(&plan, &summary)?;
//!     }
//! }
//! ```

pub mod cli;
pub mod config;
mod store;

pub use store::{
    ChatMessage, CompressionPlan, ContextStore, MessageRecord, PlanningEvent, SummaryRecord, TaskMetadata,
    ToolCallRecord, estimate_tokens,
};
