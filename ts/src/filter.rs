//! Query filters over a `Store`'s indexed columns.

/// A value that can appear on the right-hand side of a `Filter`.
///
/// Mirrors the SQLite affinities the store actually uses: integers
/// (timestamps, counters), text (status strings, hashes), and an explicit
/// null for "field absent" checks.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    Int(i64),
    Text(String),
    Null,
}

impl From<i64> for IndexValue {
    fn from(v: i64) -> Self {
        IndexValue::Int(v)
    }
}

impl From<&str> for IndexValue {
    fn from(v: &str) -> Self {
        IndexValue::Text(v.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(v: String) -> Self {
        IndexValue::Text(v)
    }
}

impl<T: Into<IndexValue>> From<Option<T>> for IndexValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => IndexValue::Null,
        }
    }
}

/// Comparison operator for a `Filter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
        }
    }
}

/// A single `field OP value` predicate. `Store::query` ANDs a slice of these
/// together; there is no OR support, which matches every query this crate
/// actually needs to run.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: &'static str,
    pub op: FilterOp,
    pub value: IndexValue,
}

impl Filter {
    pub fn eq(field: &'static str, value: impl Into<IndexValue>) -> Self {
        Self {
            field,
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn new(field: &'static str, op: FilterOp, value: impl Into<IndexValue>) -> Self {
        Self {
            field,
            op,
            value: value.into(),
        }
    }
}
