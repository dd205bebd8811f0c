//! Error types for the store layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record {id} already exists in collection {collection}")]
    Duplicate { id: String, collection: String },

    #[error("unsupported filter operation {op:?} on indexed field {field}")]
    UnsupportedFilter { field: String, op: String },
}

pub type StoreResult<T> = Result<T, StoreError>;
