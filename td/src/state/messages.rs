//! State manager messages - commands and responses for the actor pattern.

use tokio::sync::oneshot;

use crate::domain::TaskRecord;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    StoreError(String),

    #[error("channel error")]
    ChannelError,
}

pub type StateResponse<T> = Result<T, StateError>;

/// A query against the task index, ANDed together by the caller's choice of
/// fields (mirrors `taskstore::Filter`'s AND-only semantics).
#[derive(Debug, Default, Clone)]
pub struct TaskQuery {
    pub status: Option<String>,
    pub key_hash: Option<String>,
    pub requester: Option<String>,
}

#[derive(Debug)]
pub enum StateCommand {
    Create {
        record: TaskRecord,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    Get {
        uuid: String,
        reply: oneshot::Sender<StateResponse<TaskRecord>>,
    },
    Update {
        record: TaskRecord,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    Query {
        query: TaskQuery,
        reply: oneshot::Sender<StateResponse<Vec<TaskRecord>>>,
    },
    RebuildIndex {
        reply: oneshot::Sender<StateResponse<()>>,
    },
    Shutdown,
}
