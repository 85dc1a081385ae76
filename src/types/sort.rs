//! The heterogeneous scalar values that make up a sort key / pagination cursor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single sort-axis value. Cursors round-trip a `Vec<SortValue>`, one per
/// active sort axis, always terminated by an `Id` tiebreak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum SortValue {
    Str(String),
    I64(i64),
    F64(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl SortValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            SortValue::Str(_) => "str",
            SortValue::I64(_) => "i64",
            SortValue::F64(_) => "f64",
            SortValue::Bool(_) => "bool",
            SortValue::Timestamp(_) => "timestamp",
        }
    }
}
