//! The `Record` trait every stored type implements.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::filter::IndexValue;

/// A type that can be persisted through a `Store`.
///
/// `collection_name` picks the JSONL file and SQLite table; `id` and
/// `updated_at` are the two columns every collection carries regardless of
/// the record's own shape. `indexed_fields` lists the additional columns the
/// store should extract into SQLite so `Filter`-based queries don't require a
/// full JSONL scan.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Stable identifier, unique within the collection.
    fn id(&self) -> &str;

    /// Last-modified timestamp (ms since epoch), used for `ORDER BY` and
    /// staleness sweeps.
    fn updated_at(&self) -> i64;

    /// Name of the JSONL file / SQLite table this record type lives in.
    fn collection_name() -> &'static str;

    /// Additional columns to index, as `(field_name, value)` pairs computed
    /// from the record's current state. Called on every insert/update.
    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)>;
}
