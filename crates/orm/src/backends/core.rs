//! Core Database Backend Types
//!
//! Value, row and dialect types shared by every backend. Backends translate
//! the query IR into their native form but all of them exchange data through
//! [`DatabaseValue`] and [`Row`].

use std::cmp::Ordering;
use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::{ModelError, ModelResult};

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    Json(JsonValue),
    Array(Vec<DatabaseValue>),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Whether the value is a nested structure rather than a scalar
    pub fn is_structured(&self) -> bool {
        match self {
            DatabaseValue::Array(_) => true,
            DatabaseValue::Json(json) => json.is_object() || json.is_array(),
            _ => false,
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Bool(b) => JsonValue::Bool(*b),
            DatabaseValue::Int32(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DatabaseValue::Int64(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DatabaseValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::String(s) => JsonValue::String(s.clone()),
            DatabaseValue::Bytes(b) => JsonValue::Array(
                b.iter()
                    .map(|&x| JsonValue::Number(serde_json::Number::from(x)))
                    .collect(),
            ),
            DatabaseValue::Uuid(u) => JsonValue::String(u.to_string()),
            DatabaseValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
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
            JsonValue::String(s) => {
                if let Ok(uuid) = uuid::Uuid::parse_str(&s) {
                    DatabaseValue::Uuid(uuid)
                } else if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(&s) {
                    DatabaseValue::DateTime(dt.with_timezone(&chrono::Utc))
                } else {
                    DatabaseValue::String(s)
                }
            }
            JsonValue::Array(_) | JsonValue::Object(_) => DatabaseValue::Json(json),
        }
    }

    /// Compare two values of compatible types.
    ///
    /// Integers and floats compare numerically across widths. Values of
    /// unrelated types (or nulls) are unordered.
    pub fn compare(&self, other: &DatabaseValue) -> Option<Ordering> {
        use DatabaseValue::*;

        match (self, other) {
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (String(a), String(b)) => Some(a.cmp(b)),
            (Uuid(a), Uuid(b)) => Some(a.cmp(b)),
            (DateTime(a), DateTime(b)) => Some(a.cmp(b)),
            (Bytes(a), Bytes(b)) => Some(a.cmp(b)),
            (Float64(a), Float64(b)) => a.partial_cmp(b),
            (Float64(a), _) => other.as_i64().and_then(|b| a.partial_cmp(&(b as f64))),
            (_, Float64(b)) => self.as_i64().and_then(|a| (a as f64).partial_cmp(b)),
            _ => match (self.as_i64(), other.as_i64()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => None,
            },
        }
    }

    /// Equality used by filter evaluation: numeric widths are interchangeable
    pub fn loosely_equals(&self, other: &DatabaseValue) -> bool {
        match (self, other) {
            (DatabaseValue::Null, DatabaseValue::Null) => true,
            (DatabaseValue::Null, _) | (_, DatabaseValue::Null) => false,
            _ => match self.compare(other) {
                Some(ordering) => ordering == Ordering::Equal,
                None => self == other,
            },
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int32(i) => Some(i64::from(*i)),
            DatabaseValue::Int64(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for DatabaseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseValue::Null => write!(f, "NULL"),
            DatabaseValue::String(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

macro_rules! database_value_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for DatabaseValue {
                fn from(value: $source) -> Self {
                    DatabaseValue::$variant(value)
                }
            }
        )*
    };
}

database_value_from! {
    bool => Bool,
    i32 => Int32,
    i64 => Int64,
    f64 => Float64,
    String => String,
    Vec<u8> => Bytes,
    uuid::Uuid => Uuid,
    chrono::DateTime<chrono::Utc> => DateTime,
    JsonValue => Json,
}

impl From<&str> for DatabaseValue {
    fn from(text: &str) -> Self {
        DatabaseValue::String(text.to_owned())
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(DatabaseValue::Null, Into::into)
    }
}

/// A single result row: ordered column names with their values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, DatabaseValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, replacing any previous value under the same name
    pub fn set(&mut self, column: impl Into<String>, value: DatabaseValue) {
        let column = column.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some((_, existing)) => *existing = value,
            None => self.columns.push((column, value)),
        }
    }

    pub fn remove(&mut self, column: &str) -> Option<DatabaseValue> {
        let index = self.columns.iter().position(|(name, _)| name == column)?;
        Some(self.columns.remove(index).1)
    }

    /// Get a column value by name
    pub fn get_by_name(&self, column: &str) -> Option<&DatabaseValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get_by_name(column).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DatabaseValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Get a typed value from a column
    pub fn get<T: DeserializeOwned>(&self, column: &str) -> ModelResult<T> {
        let value = self
            .get_by_name(column)
            .ok_or_else(|| ModelError::Serialization(format!("Column '{}' not found", column)))?;

        serde_json::from_value(value.to_json()).map_err(|e| {
            ModelError::Serialization(format!("Failed to deserialize column '{}': {}", column, e))
        })
    }

    /// Try to get an optional typed value from a column; missing or null yields `None`
    pub fn try_get<T: DeserializeOwned>(&self, column: &str) -> ModelResult<Option<T>> {
        match self.get_by_name(column) {
            None | Some(DatabaseValue::Null) => Ok(None),
            Some(_) => self.get(column).map(Some),
        }
    }

    /// Decode the whole row into a deserializable type
    pub fn decode<T: DeserializeOwned>(&self) -> ModelResult<T> {
        serde_json::from_value(self.to_json())
            .map_err(|e| ModelError::Serialization(format!("Failed to decode row: {}", e)))
    }

    /// Convert row to JSON object
    pub fn to_json(&self) -> JsonValue {
        let map = self
            .columns
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        JsonValue::Object(map)
    }
}

impl FromIterator<(String, DatabaseValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, DatabaseValue)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.set(column, value);
        }
        row
    }
}

/// A rendered statement and the values bound to it out-of-band
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub binds: Vec<DatabaseValue>,
}

/// Feature set a backend declares; checked before building joins, indexes,
/// references or transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    pub joins: bool,
    pub indexes: bool,
    pub references: bool,
    pub transactions: bool,
    /// Whether nested JSON values can be stored in a column
    pub structured_values: bool,
}

impl BackendCapabilities {
    pub const ALL: BackendCapabilities = BackendCapabilities {
        joins: true,
        indexes: true,
        references: true,
        transactions: true,
        structured_values: true,
    };
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

    /// Get the quote character for identifiers in this dialect
    pub fn identifier_quote(&self) -> char {
        match self {
            SqlDialect::PostgreSQL => '"',
            SqlDialect::MySQL => '`',
            SqlDialect::SQLite => '"',
        }
    }

    /// Quote an identifier, splitting `entity.field` into two quoted parts
    pub fn quote_identifier(&self, identifier: &str) -> String {
        let quote = self.identifier_quote();
        let escaped = format!("{}{}", quote, quote);

        identifier
            .split('.')
            .map(|part| format!("{quote}{}{quote}", part.replace(quote, &escaped)))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Check if this dialect supports JSON types
    pub fn supports_json(&self) -> bool {
        match self {
            SqlDialect::PostgreSQL | SqlDialect::MySQL => true,
            SqlDialect::SQLite => false,
        }
    }

    /// Whether INSERT/UPDATE/DELETE accept a RETURNING clause
    pub fn supports_returning(&self) -> bool {
        match self {
            SqlDialect::PostgreSQL | SqlDialect::SQLite => true,
            SqlDialect::MySQL => false,
        }
    }

    pub fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            structured_values: self.supports_json(),
            ..BackendCapabilities::ALL
        }
    }
}
