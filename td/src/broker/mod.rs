//! Durable at-least-once task delivery, reusing the sqlite index database
//! already opened for `state::Index` (`tasks.db`) for a `queue` table, plus
//! an fs2 advisory file lock that serializes producers across hosts sharing
//! the filesystem.

mod lock;
mod queue;

pub use lock::ProducerLock;
pub use queue::{Envelope, Queue};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error at {path}: {source}")]
    Io { path: String, source: std::io::Error },
}
