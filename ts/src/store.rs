//! `Store<T>` - a SQLite index over an append-only JSONL log.
//!
//! The JSONL file (`{collection}.jsonl`) is the record of truth: every
//! `insert`/`update` appends one line, a `delete` appends a tombstone line.
//! Nothing is ever rewritten. The SQLite tables are a rebuildable cache that
//! makes `query` fast; `rebuild_index` replays the log from scratch and is
//! meant to be called once per process at startup, mirroring the "rebuild
//! indexes on boot" pattern the state actor uses.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::filter::Filter;
use crate::record::Record;

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum LogLine<T> {
    Tombstone { id: String, deleted_at: i64, tombstone: bool },
    Live(T),
}

/// A persistent, queryable collection of `T`.
pub struct Store<T: Record> {
    base_path: PathBuf,
    conn: Mutex<Connection>,
    _marker: PhantomData<T>,
}

impl<T: Record> Store<T> {
    /// Open (creating if absent) the store rooted at `base_path`. All record
    /// types sharing a `base_path` share one `store.db` but get their own
    /// table and JSONL file.
    pub fn open(base_path: impl AsRef<Path>) -> StoreResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).map_err(|e| StoreError::Io {
            path: base_path.display().to_string(),
            source: e,
        })?;

        let db_path = base_path.join("store.db");
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self {
            base_path,
            conn: Mutex::new(conn),
            _marker: PhantomData,
        };
        store.ensure_tables()?;
        debug!(collection = T::collection_name(), "Store::open: ready");
        Ok(store)
    }

    fn jsonl_path(&self) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", T::collection_name()))
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let name = T::collection_name();
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {name} (
                id TEXT PRIMARY KEY,
                updated_at INTEGER NOT NULL,
                data TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS {name}_index (
                id TEXT NOT NULL,
                field TEXT NOT NULL,
                value_int INTEGER,
                value_text TEXT,
                PRIMARY KEY (id, field)
            );
            CREATE INDEX IF NOT EXISTS idx_{name}_field_int ON {name}_index(field, value_int);
            CREATE INDEX IF NOT EXISTS idx_{name}_field_text ON {name}_index(field, value_text);
            CREATE TABLE IF NOT EXISTS {name}_tombstones (
                id TEXT PRIMARY KEY,
                deleted_at INTEGER NOT NULL
            );"
        ))?;
        Ok(())
    }

    fn append_log(&self, line: &LogLine<T>) -> StoreResult<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(self.jsonl_path()).map_err(|e| {
            StoreError::Io {
                path: self.jsonl_path().display().to_string(),
                source: e,
            }
        })?;
        let json = serde_json::to_string(line)?;
        writeln!(file, "{json}").map_err(|e| StoreError::Io {
            path: self.jsonl_path().display().to_string(),
            source: e,
        })?;
        file.flush().ok();
        Ok(())
    }

    fn upsert_index(&self, conn: &Connection, record: &T) -> StoreResult<()> {
        let name = T::collection_name();
        let data = serde_json::to_string(record)?;
        conn.execute(
            &format!("INSERT INTO {name} (id, updated_at, data) VALUES (?1, ?2, ?3) ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at, data = excluded.data"),
            params![record.id(), record.updated_at(), data],
        )?;
        conn.execute(&format!("DELETE FROM {name}_index WHERE id = ?1"), params![record.id()])?;
        for (field, value) in record.indexed_fields() {
            let (value_int, value_text): (Option<i64>, Option<String>) = match value {
                crate::filter::IndexValue::Int(i) => (Some(i), None),
                crate::filter::IndexValue::Text(s) => (None, Some(s)),
                crate::filter::IndexValue::Null => (None, None),
            };
            conn.execute(
                &format!("INSERT INTO {name}_index (id, field, value_int, value_text) VALUES (?1, ?2, ?3, ?4)"),
                params![record.id(), field, value_int, value_text],
            )?;
        }
        conn.execute(&format!("DELETE FROM {name}_tombstones WHERE id = ?1"), params![record.id()])?;
        Ok(())
    }

    /// Insert a brand-new record. Errors if `id` already exists.
    pub fn insert(&self, record: &T) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let name = T::collection_name();
        let exists: bool = conn
            .query_row(&format!("SELECT 1 FROM {name} WHERE id = ?1"), params![record.id()], |_| Ok(()))
            .is_ok();
        if exists {
            return Err(StoreError::Duplicate {
                id: record.id().to_string(),
                collection: name.to_string(),
            });
        }
        self.append_log(&LogLine::Live(record.clone()))?;
        self.upsert_index(&conn, record)?;
        Ok(())
    }

    /// Insert or overwrite a record by id.
    pub fn upsert(&self, record: &T) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        self.append_log(&LogLine::Live(record.clone()))?;
        self.upsert_index(&conn, record)?;
        Ok(())
    }

    /// Fetch a single record by id.
    pub fn get(&self, id: &str) -> StoreResult<T> {
        let name = T::collection_name();
        let conn = self.conn.lock().unwrap();
        let data: String = conn
            .query_row(&format!("SELECT data FROM {name} WHERE id = ?1"), params![id], |row| row.get(0))
            .map_err(|_| StoreError::NotFound(id.to_string()))?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Remove a record, appending a tombstone so `rebuild_index` doesn't
    /// resurrect it.
    pub fn delete(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let name = T::collection_name();
        self.append_log(&LogLine::Tombstone {
            id: id.to_string(),
            deleted_at: crate::id::now_ms(),
            tombstone: true,
        })?;
        conn.execute(&format!("DELETE FROM {name} WHERE id = ?1"), params![id])?;
        conn.execute(&format!("DELETE FROM {name}_index WHERE id = ?1"), params![id])?;
        conn.execute(
            &format!("INSERT OR REPLACE INTO {name}_tombstones (id, deleted_at) VALUES (?1, ?2)"),
            params![id, crate::id::now_ms()],
        )?;
        Ok(())
    }

    /// AND together a slice of `Filter`s and return every matching record,
    /// most-recently-updated first.
    pub fn query(&self, filters: &[Filter]) -> StoreResult<Vec<T>> {
        let name = T::collection_name();
        let conn = self.conn.lock().unwrap();

        let mut sql = format!("SELECT r.data FROM {name} r");
        let mut values: Vec<Value> = Vec::new();
        for (i, f) in filters.iter().enumerate() {
            sql.push_str(&format!(
                " JOIN {name}_index i{i} ON i{i}.id = r.id AND i{i}.field = ?{}",
                values.len() + 1
            ));
            values.push(Value::String(f.field.to_string()));
        }
        if !filters.is_empty() {
            sql.push_str(" WHERE ");
            let mut clauses = Vec::new();
            for (i, f) in filters.iter().enumerate() {
                let (col, bind) = match &f.value {
                    crate::filter::IndexValue::Int(v) => ("value_int", Value::Number((*v).into())),
                    crate::filter::IndexValue::Text(v) => ("value_text", Value::String(v.clone())),
                    crate::filter::IndexValue::Null => ("value_text", Value::Null),
                };
                values.push(bind);
                clauses.push(format!("i{i}.{col} {} ?{}", f.op.as_sql(), values.len()));
            }
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY r.updated_at DESC");

        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<rusqlite::types::Value> = values
            .into_iter()
            .map(|v| match v {
                Value::String(s) => rusqlite::types::Value::Text(s),
                Value::Number(n) => rusqlite::types::Value::Integer(n.as_i64().unwrap_or_default()),
                _ => rusqlite::types::Value::Null,
            })
            .collect();
        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let rows = stmt.query_map(params_ref.as_slice(), |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    /// Return every non-deleted record, most-recently-updated first.
    pub fn list_all(&self) -> StoreResult<Vec<T>> {
        self.query(&[])
    }

    pub fn count(&self) -> StoreResult<usize> {
        let name = T::collection_name();
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {name}"), [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Replay `{collection}.jsonl` from scratch into the SQLite tables.
    /// Call once at process startup before relying on `query`.
    pub fn rebuild_index(&self) -> StoreResult<()> {
        let name = T::collection_name();
        let path = self.jsonl_path();
        if !path.exists() {
            return Ok(());
        }

        let file = File::open(&path).map_err(|e| StoreError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let reader = BufReader::new(file);

        let mut latest: HashMap<String, T> = HashMap::new();
        let mut deleted: HashMap<String, i64> = HashMap::new();
        let mut malformed = 0usize;

        for line in reader.lines() {
            let line = line.map_err(|e| StoreError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogLine<T>>(&line) {
                Ok(LogLine::Live(record)) => {
                    deleted.remove(record.id());
                    latest.insert(record.id().to_string(), record);
                }
                Ok(LogLine::Tombstone { id, deleted_at, .. }) => {
                    latest.remove(&id);
                    deleted.insert(id, deleted_at);
                }
                Err(_) => malformed += 1,
            }
        }
        if malformed > 0 {
            warn!(collection = name, malformed, "rebuild_index: skipped malformed lines");
        }

        let conn = self.conn.lock().unwrap();
        conn.execute(&format!("DELETE FROM {name}"), [])?;
        conn.execute(&format!("DELETE FROM {name}_index"), [])?;
        conn.execute(&format!("DELETE FROM {name}_tombstones"), [])?;
        for record in latest.values() {
            self.upsert_index(&conn, record)?;
        }
        for (id, deleted_at) in deleted {
            conn.execute(
                &format!("INSERT OR REPLACE INTO {name}_tombstones (id, deleted_at) VALUES (?1, ?2)"),
                params![id, deleted_at],
            )?;
        }
        info!(collection = name, count = latest.len(), "rebuild_index: complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, FilterOp, IndexValue};
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Widget {
        id: String,
        updated_at: i64,
        status: String,
        count: i64,
    }

    impl Record for Widget {
        fn id(&self) -> &str {
            &self.id
        }
        fn updated_at(&self) -> i64 {
            self.updated_at
        }
        fn collection_name() -> &'static str {
            "widgets"
        }
        fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
            vec![("status", self.status.clone().into()), ("count", self.count.into())]
        }
    }

    fn widget(id: &str, status: &str, count: i64) -> Widget {
        Widget {
            id: id.to_string(),
            updated_at: crate::id::now_ms(),
            status: status.to_string(),
            count,
        }
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store: Store<Widget> = Store::open(dir.path()).unwrap();
        let w = widget("w1", "running", 3);
        store.insert(&w).unwrap();
        assert_eq!(store.get("w1").unwrap(), w);
    }

    #[test]
    fn duplicate_insert_errors() {
        let dir = TempDir::new().unwrap();
        let store: Store<Widget> = Store::open(dir.path()).unwrap();
        store.insert(&widget("w1", "running", 1)).unwrap();
        let err = store.insert(&widget("w1", "running", 1)).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[test]
    fn query_by_indexed_field() {
        let dir = TempDir::new().unwrap();
        let store: Store<Widget> = Store::open(dir.path()).unwrap();
        store.insert(&widget("w1", "running", 1)).unwrap();
        store.insert(&widget("w2", "completed", 2)).unwrap();
        store.insert(&widget("w3", "running", 3)).unwrap();

        let running = store.query(&[Filter::eq("status", "running")]).unwrap();
        assert_eq!(running.len(), 2);

        let big = store.query(&[Filter::new("count", FilterOp::Gt, 1i64)]).unwrap();
        assert_eq!(big.len(), 2);
    }

    #[test]
    fn delete_removes_from_query_and_survives_rebuild() {
        let dir = TempDir::new().unwrap();
        let store: Store<Widget> = Store::open(dir.path()).unwrap();
        store.insert(&widget("w1", "running", 1)).unwrap();
        store.delete("w1").unwrap();
        assert!(store.get("w1").is_err());

        store.rebuild_index().unwrap();
        assert!(store.get("w1").is_err());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn rebuild_index_replays_log_with_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let store: Store<Widget> = Store::open(dir.path()).unwrap();
        store.insert(&widget("w1", "running", 1)).unwrap();
        store.upsert(&widget("w1", "completed", 1)).unwrap();

        store.rebuild_index().unwrap();
        let w = store.get("w1").unwrap();
        assert_eq!(w.status, "completed");

        let completed = store.query(&[Filter::eq("status", "completed")]).unwrap();
        assert_eq!(completed.len(), 1);
    }

    #[test]
    fn upsert_overwrites_existing_record() {
        let dir = TempDir::new().unwrap();
        let store: Store<Widget> = Store::open(dir.path()).unwrap();
        store.insert(&widget("w1", "running", 1)).unwrap();
        store.upsert(&widget("w1", "running", 99)).unwrap();
        assert_eq!(store.get("w1").unwrap().count, 99);
    }
}
