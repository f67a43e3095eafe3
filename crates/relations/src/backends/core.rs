//! Core Backend Types
//!
//! Values, rows and the query-execution contract consumed by the relation
//! engine. Executors compile a [`QueryBuilder`] however they like; the engine
//! only ever composes builder calls against this interface.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::error::{ModelError, OrmResult};
use crate::query::QueryBuilder;

/// A fetched or to-be-written row, column name to value
pub type Row = HashMap<String, DatabaseValue>;

/// Query-execution engine contract
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute a SELECT and return the projected rows
    async fn select(&self, query: &QueryBuilder) -> OrmResult<Vec<Row>>;

    /// Count the rows matched by the query, ignoring limit and offset
    async fn count(&self, query: &QueryBuilder) -> OrmResult<u64>;

    /// Insert rows into a table, returning the number of inserted rows
    async fn insert(&self, table: &str, rows: &[Row]) -> OrmResult<u64>;

    /// Insert a single row and return the value of its primary key
    async fn insert_get_id(&self, table: &str, row: &Row, key_name: &str) -> OrmResult<DatabaseValue>;

    /// Update every row matched by the query's FROM table and WHERE clause
    async fn update(&self, query: &QueryBuilder, values: &Row) -> OrmResult<u64>;

    /// Add `amount` to a numeric column on every matched row, assigning
    /// `extra` columns in the same statement
    async fn increment(&self, query: &QueryBuilder, column: &str, amount: &DatabaseValue, extra: &Row) -> OrmResult<u64>;

    /// Delete every row matched by the query's FROM table and WHERE clause
    async fn delete(&self, query: &QueryBuilder) -> OrmResult<u64>;
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    Json(JsonValue),
    Array(Vec<DatabaseValue>),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Current UTC timestamp, used for `created_at`/`updated_at`/`deleted_at`
    pub fn now() -> Self {
        DatabaseValue::DateTime(chrono::Utc::now())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int32(i) => Some(*i as i64),
            DatabaseValue::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DatabaseValue::Int32(i) => Some(*i as f64),
            DatabaseValue::Int64(i) => Some(*i as f64),
            DatabaseValue::Float32(f) => Some(*f as f64),
            DatabaseValue::Float64(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Normalized string form used to key in-memory dictionaries.
    ///
    /// Integers and integral floats share a representation, so `Int32(3)`,
    /// `Int64(3)`, `Float64(3.0)` and `String("3")` all land on the same key.
    /// Null has no key.
    pub fn dictionary_key(&self) -> Option<String> {
        match self {
            DatabaseValue::Null => None,
            DatabaseValue::Float32(f) => Some(float_key(*f as f64)),
            DatabaseValue::Float64(f) => Some(float_key(*f)),
            DatabaseValue::String(s) => Some(s.clone()),
            DatabaseValue::Array(_) | DatabaseValue::Bytes(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Equality that ignores the storage width/representation of a value.
    ///
    /// Two nulls are equal here; SQL comparison semantics live in the executors.
    pub fn loosely_equals(&self, other: &DatabaseValue) -> bool {
        match (self, other) {
            (DatabaseValue::Null, DatabaseValue::Null) => true,
            (DatabaseValue::Null, _) | (_, DatabaseValue::Null) => false,
            (DatabaseValue::Json(a), DatabaseValue::Json(b)) => a == b,
            (a, b) => match (a.dictionary_key(), b.dictionary_key()) {
                (Some(a), Some(b)) => a == b,
                _ => a == b,
            },
        }
    }

    /// Ordering between two non-null values of compatible kinds
    pub fn compare(&self, other: &DatabaseValue) -> Option<Ordering> {
        match (self, other) {
            (DatabaseValue::Null, _) | (_, DatabaseValue::Null) => None,
            (a, b) if a.as_i64().is_some() && b.as_i64().is_some() => {
                Some(a.as_i64()?.cmp(&b.as_i64()?))
            }
            (a, b) if a.as_f64().is_some() && b.as_f64().is_some() => {
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
            (DatabaseValue::Bool(a), DatabaseValue::Bool(b)) => Some(a.cmp(b)),
            (DatabaseValue::DateTime(a), DatabaseValue::DateTime(b)) => Some(a.cmp(b)),
            (DatabaseValue::Date(a), DatabaseValue::Date(b)) => Some(a.cmp(b)),
            (DatabaseValue::Time(a), DatabaseValue::Time(b)) => Some(a.cmp(b)),
            (DatabaseValue::Uuid(a), DatabaseValue::Uuid(b)) => Some(a.cmp(b)),
            (a, b) => Some(a.dictionary_key()?.cmp(&b.dictionary_key()?)),
        }
    }

    /// Numeric sum with SQL null propagation; `None` when either side is not a number
    pub fn checked_add(&self, other: &DatabaseValue) -> Option<DatabaseValue> {
        if self.is_null() || other.is_null() {
            return Some(DatabaseValue::Null);
        }
        match (self.as_i64(), other.as_i64()) {
            (Some(a), Some(b)) => a.checked_add(b).map(DatabaseValue::Int64),
            _ => Some(DatabaseValue::Float64(self.as_f64()? + other.as_f64()?)),
        }
    }

    /// Arithmetic negation of a number
    pub fn negated(&self) -> Option<DatabaseValue> {
        match self {
            DatabaseValue::Int32(i) => Some(DatabaseValue::Int64(-(*i as i64))),
            DatabaseValue::Int64(i) => i.checked_neg().map(DatabaseValue::Int64),
            DatabaseValue::Float32(f) => Some(DatabaseValue::Float64(-(*f as f64))),
            DatabaseValue::Float64(f) => Some(DatabaseValue::Float64(-f)),
            _ => None,
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Bool(b) => JsonValue::Bool(*b),
            DatabaseValue::Int32(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DatabaseValue::Int64(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DatabaseValue::Float32(f) => serde_json::Number::from_f64(*f as f64)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::String(s) => JsonValue::String(s.clone()),
            DatabaseValue::Bytes(b) => JsonValue::Array(
                b.iter().map(|&x| JsonValue::Number(serde_json::Number::from(x))).collect(),
            ),
            DatabaseValue::Uuid(u) => JsonValue::String(u.to_string()),
            DatabaseValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            DatabaseValue::Date(d) => JsonValue::String(d.to_string()),
            DatabaseValue::Time(t) => JsonValue::String(t.to_string()),
            DatabaseValue::Json(j) => j.clone(),
            DatabaseValue::Array(arr) => JsonValue::Array(arr.iter().map(|v| v.to_json()).collect()),
        }
    }

    /// Create DatabaseValue from JSON value
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => DatabaseValue::Null,
            JsonValue::Bool(b) => DatabaseValue::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DatabaseValue::Int64(i)
                } else if let Some(f) = n.as_f64() {
                    DatabaseValue::Float64(f)
                } else {
                    DatabaseValue::Null
                }
            }
            JsonValue::String(s) => DatabaseValue::String(s),
            JsonValue::Array(arr) => {
                DatabaseValue::Array(arr.into_iter().map(DatabaseValue::from_json).collect())
            }
            JsonValue::Object(_) => DatabaseValue::Json(json),
        }
    }
}

fn float_key(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        (f as i64).to_string()
    } else {
        f.to_string()
    }
}

impl fmt::Display for DatabaseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseValue::Null => write!(f, "NULL"),
            DatabaseValue::Bool(b) => write!(f, "{}", b),
            DatabaseValue::Int32(i) => write!(f, "{}", i),
            DatabaseValue::Int64(i) => write!(f, "{}", i),
            DatabaseValue::Float32(v) => write!(f, "{}", v),
            DatabaseValue::Float64(v) => write!(f, "{}", v),
            DatabaseValue::String(s) => write!(f, "{}", s),
            DatabaseValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            DatabaseValue::Uuid(u) => write!(f, "{}", u),
            DatabaseValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            DatabaseValue::Date(d) => write!(f, "{}", d),
            DatabaseValue::Time(t) => write!(f, "{}", t),
            DatabaseValue::Json(j) => write!(f, "{}", j),
            DatabaseValue::Array(arr) => {
                let items: Vec<String> = arr.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
        }
    }
}

impl Serialize for DatabaseValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<u32> for DatabaseValue {
    fn from(value: u32) -> Self {
        DatabaseValue::Int64(value as i64)
    }
}

impl From<f32> for DatabaseValue {
    fn from(value: f32) -> Self {
        DatabaseValue::Float32(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(value: Vec<u8>) -> Self {
        DatabaseValue::Bytes(value)
    }
}

impl From<uuid::Uuid> for DatabaseValue {
    fn from(value: uuid::Uuid) -> Self {
        DatabaseValue::Uuid(value)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DatabaseValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl From<chrono::NaiveDate> for DatabaseValue {
    fn from(value: chrono::NaiveDate) -> Self {
        DatabaseValue::Date(value)
    }
}

impl From<chrono::NaiveTime> for DatabaseValue {
    fn from(value: chrono::NaiveTime) -> Self {
        DatabaseValue::Time(value)
    }
}

impl From<JsonValue> for DatabaseValue {
    fn from(value: JsonValue) -> Self {
        DatabaseValue::from_json(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// Declared type of a model's primary key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyType {
    #[default]
    Int,
    Float,
    String,
}

impl KeyType {
    /// Coerce a key to this type.
    ///
    /// Keys read back from storage and keys supplied by callers can differ
    /// in representation (`"2"` vs `2`); everything that compares key sets
    /// runs both sides through here first.
    pub fn cast(&self, value: &DatabaseValue) -> OrmResult<DatabaseValue> {
        let invalid = || ModelError::InvalidKey(format!("cannot cast '{}' to a {:?} key", value, self));

        match self {
            KeyType::Int => match value {
                DatabaseValue::Int32(i) => Ok(DatabaseValue::Int64(*i as i64)),
                DatabaseValue::Int64(i) => Ok(DatabaseValue::Int64(*i)),
                DatabaseValue::Float32(_) | DatabaseValue::Float64(_) => {
                    let f = value.as_f64().ok_or_else(invalid)?;
                    if f.fract() == 0.0 && f.is_finite() {
                        Ok(DatabaseValue::Int64(f as i64))
                    } else {
                        Err(invalid())
                    }
                }
                DatabaseValue::String(s) => {
                    let s = s.trim();
                    if let Ok(i) = s.parse::<i64>() {
                        return Ok(DatabaseValue::Int64(i));
                    }
                    match s.parse::<f64>() {
                        Ok(f) if f.fract() == 0.0 && f.is_finite() => Ok(DatabaseValue::Int64(f as i64)),
                        _ => Err(invalid()),
                    }
                }
                _ => Err(invalid()),
            },
            KeyType::Float => match value {
                DatabaseValue::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(DatabaseValue::Float64)
                    .map_err(|_| invalid()),
                other => other.as_f64().map(DatabaseValue::Float64).ok_or_else(invalid),
            },
            KeyType::String => value
                .dictionary_key()
                .map(DatabaseValue::String)
                .ok_or_else(invalid),
        }
    }
}

/// SQL dialect enumeration for generating database-specific SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    MySQL,
    SQLite,
}

impl SqlDialect {
    /// Get the parameter placeholder style for this dialect
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::MySQL | SqlDialect::SQLite => "?".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dictionary_keys_ignore_representation() {
        assert_eq!(DatabaseValue::Int32(3).dictionary_key(), Some("3".to_string()));
        assert_eq!(DatabaseValue::Int64(3).dictionary_key(), Some("3".to_string()));
        assert_eq!(DatabaseValue::Float64(3.0).dictionary_key(), Some("3".to_string()));
        assert_eq!(DatabaseValue::from("3").dictionary_key(), Some("3".to_string()));
        assert_eq!(DatabaseValue::Float64(2.5).dictionary_key(), Some("2.5".to_string()));
        assert_eq!(DatabaseValue::Null.dictionary_key(), None);
    }

    #[test]
    fn test_int_key_cast() {
        let key = KeyType::Int;
        assert_eq!(key.cast(&DatabaseValue::from("2")).unwrap(), DatabaseValue::Int64(2));
        assert_eq!(key.cast(&DatabaseValue::Int32(2)).unwrap(), DatabaseValue::Int64(2));
        assert_eq!(key.cast(&DatabaseValue::Float64(4.0)).unwrap(), DatabaseValue::Int64(4));
        assert!(matches!(key.cast(&DatabaseValue::from("abc")), Err(ModelError::InvalidKey(_))));
        assert!(key.cast(&DatabaseValue::Null).is_err());
    }

    #[test]
    fn test_float_and_string_key_cast() {
        assert_eq!(KeyType::Float.cast(&DatabaseValue::from("1.5")).unwrap(), DatabaseValue::Float64(1.5));
        assert_eq!(KeyType::Float.cast(&DatabaseValue::Int64(1)).unwrap(), DatabaseValue::Float64(1.0));
        assert_eq!(KeyType::String.cast(&DatabaseValue::Int64(7)).unwrap(), DatabaseValue::from("7"));
    }

    #[test]
    fn test_compare_mixed_numeric_widths() {
        assert_eq!(DatabaseValue::Int32(2).compare(&DatabaseValue::Int64(10)), Some(Ordering::Less));
        assert_eq!(DatabaseValue::Float64(2.5).compare(&DatabaseValue::Int64(2)), Some(Ordering::Greater));
        assert_eq!(DatabaseValue::Null.compare(&DatabaseValue::Int64(2)), None);
        assert!(DatabaseValue::Int32(5).loosely_equals(&DatabaseValue::from("5")));
    }

    #[test]
    fn test_numeric_arithmetic() {
        assert_eq!(DatabaseValue::Int32(2).checked_add(&DatabaseValue::Int64(3)), Some(DatabaseValue::Int64(5)));
        assert_eq!(
            DatabaseValue::Float64(1.5).checked_add(&DatabaseValue::Int64(1)),
            Some(DatabaseValue::Float64(2.5))
        );
        assert_eq!(DatabaseValue::Null.checked_add(&DatabaseValue::Int64(1)), Some(DatabaseValue::Null));
        assert_eq!(DatabaseValue::from("a").checked_add(&DatabaseValue::Int64(1)), None);
        assert_eq!(DatabaseValue::Int32(4).negated(), Some(DatabaseValue::Int64(-4)));
        assert_eq!(DatabaseValue::Bool(true).negated(), None);
    }
}
