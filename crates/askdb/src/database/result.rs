//! Result shapes produced by the executor.

use std::fmt;

use rusqlite::types::ValueRef;
use serde::{Serialize, Serializer};

/// One cell of a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<ValueRef<'_>> for ScalarValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => ScalarValue::Null,
            ValueRef::Integer(i) => ScalarValue::Integer(i),
            ValueRef::Real(r) => ScalarValue::Real(r),
            ValueRef::Text(t) => ScalarValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => ScalarValue::Blob(b.to_vec()),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => f.write_str("NULL"),
            ScalarValue::Integer(i) => write!(f, "{}", i),
            ScalarValue::Real(r) => write!(f, "{}", r),
            ScalarValue::Text(t) => f.write_str(t),
            ScalarValue::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
        }
    }
}

// Cells serialize as plain JSON values so exports and API payloads stay readable.
impl Serialize for ScalarValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ScalarValue::Null => serializer.serialize_none(),
            ScalarValue::Integer(i) => serializer.serialize_i64(*i),
            ScalarValue::Real(r) => serializer.serialize_f64(*r),
            ScalarValue::Text(t) => serializer.serialize_str(t),
            ScalarValue::Blob(b) => serializer.collect_seq(b.iter()),
        }
    }
}

/// Outcome of executing one statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryResult {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<ScalarValue>>,
    },
    ExecutionFailure {
        message: String,
    },
}

impl QueryResult {
    /// Success sentinel for statements that return no rows.
    pub fn empty() -> Self {
        QueryResult::Rows {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        QueryResult::ExecutionFailure {
            message: message.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, QueryResult::ExecutionFailure { .. })
    }

    pub fn row_count(&self) -> usize {
        match self {
            QueryResult::Rows { rows, .. } => rows.len(),
            QueryResult::ExecutionFailure { .. } => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_display() {
        assert_eq!(ScalarValue::Null.to_string(), "NULL");
        assert_eq!(ScalarValue::Integer(42).to_string(), "42");
        assert_eq!(ScalarValue::Text("AC/DC".into()).to_string(), "AC/DC");
        assert_eq!(ScalarValue::Blob(vec![1, 2, 3]).to_string(), "<blob 3 bytes>");
    }

    #[test]
    fn test_query_result_serializes_with_status_tag() {
        let result = QueryResult::Rows {
            columns: vec!["Name".into(), "Score".into()],
            rows: vec![vec![ScalarValue::Text("Queen".into()), ScalarValue::Null]],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "rows");
        assert_eq!(json["columns"][0], "Name");
        assert_eq!(json["rows"][0][0], "Queen");
        assert!(json["rows"][0][1].is_null());

        let failure = serde_json::to_value(QueryResult::failure("no such table: x")).unwrap();
        assert_eq!(failure["status"], "execution_failure");
        assert_eq!(failure["message"], "no such table: x");
    }

    #[test]
    fn test_empty_is_success_sentinel() {
        let empty = QueryResult::empty();
        assert!(!empty.is_failure());
        assert_eq!(empty.row_count(), 0);
    }
}
