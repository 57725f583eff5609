//! Core Model Trait - Base definition for database entities
//!
//! Defines the Model trait with entity metadata, primary key handling,
//! timestamp and soft-delete capabilities, the serialization contract and
//! the per-model lifecycle hooks.

use std::fmt::{Debug, Display};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backends::{DatabaseValue, Row};
use crate::error::{ModelError, ModelResult};
use crate::query::{InputRow, Value};

/// Core trait for database models
///
/// Capabilities are opt-in: a model that returns `true` from
/// [`uses_timestamps`](Model::uses_timestamps) or
/// [`uses_soft_deletes`](Model::uses_soft_deletes) must also implement the
/// matching setters.
pub trait Model: Send + Sync + Debug + Clone + Serialize + DeserializeOwned + 'static {
    /// The type used for this model's primary key
    type PrimaryKey: Clone + Send + Sync + Debug + Display + Into<DatabaseValue> + DeserializeOwned;

    /// Entity (table or collection) name
    fn entity() -> &'static str;

    fn primary_key_name() -> &'static str {
        "id"
    }

    /// Get the primary key value; `None` until the model has been created
    fn primary_key(&self) -> Option<Self::PrimaryKey>;

    fn set_primary_key(&mut self, key: Self::PrimaryKey);

    /// Check if this model uses timestamps (created_at, updated_at)
    fn uses_timestamps() -> bool {
        false
    }

    fn created_at_field() -> &'static str {
        "created_at"
    }

    fn updated_at_field() -> &'static str {
        "updated_at"
    }

    fn set_created_at(&mut self, _timestamp: DateTime<Utc>) {}

    fn set_updated_at(&mut self, _timestamp: DateTime<Utc>) {}

    /// Check if this model supports soft deletes
    fn uses_soft_deletes() -> bool {
        false
    }

    fn deleted_at_field() -> &'static str {
        "deleted_at"
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn set_deleted_at(&mut self, _timestamp: Option<DateTime<Utc>>) {}

    /// Check if this model instance is soft deleted
    fn is_soft_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }

    /// Field-value pairs written on create and update.
    ///
    /// The default serializes the model with serde and leaves out an unset
    /// primary key so the backend can assign one.
    fn to_fields(&self) -> ModelResult<InputRow> {
        let json = serde_json::to_value(self)?;
        let object = match json {
            serde_json::Value::Object(object) => object,
            other => {
                return Err(ModelError::Serialization(format!(
                    "{} must serialize to an object, got {}",
                    Self::entity(),
                    other
                )))
            }
        };

        Ok(object
            .into_iter()
            .filter(|(field, value)| !(field == Self::primary_key_name() && value.is_null()))
            .map(|(field, value)| (field, Value::from(DatabaseValue::from_json(value))))
            .collect())
    }

    /// Build a model from a backend row
    fn from_row(row: &Row) -> ModelResult<Self> {
        row.decode()
    }

    /// Runs before create, after observers; an error aborts the create
    fn will_create(&mut self) -> ModelResult<()> {
        Ok(())
    }

    fn did_create(&self) -> ModelResult<()> {
        Ok(())
    }

    fn will_update(&mut self) -> ModelResult<()> {
        Ok(())
    }

    fn did_update(&self) -> ModelResult<()> {
        Ok(())
    }

    fn will_delete(&mut self) -> ModelResult<()> {
        Ok(())
    }

    fn did_delete(&self) -> ModelResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: Option<i64>,
        title: String,
        tags: Vec<String>,
    }

    impl Model for Note {
        type PrimaryKey = i64;

        fn entity() -> &'static str {
            "notes"
        }

        fn primary_key(&self) -> Option<i64> {
            self.id
        }

        fn set_primary_key(&mut self, key: i64) {
            self.id = Some(key);
        }
    }

    #[test]
    fn test_to_fields_skips_unset_identifier() {
        let note = Note {
            id: None,
            title: "Ada".to_string(),
            tags: vec!["math".to_string()],
        };
        let fields = note.to_fields().unwrap();
        let names: Vec<&str> = fields.iter().map(|(name, _)| name.as_str()).collect();

        assert!(!names.contains(&"id"));
        assert!(names.contains(&"title"));
        let tags = fields.iter().find(|(name, _)| name == "tags").unwrap();
        assert!(matches!(tags.1, Value::Bind(DatabaseValue::Json(_))));
    }

    #[test]
    fn test_row_round_trip() {
        let note = Note {
            id: None,
            title: "Ada".to_string(),
            tags: vec!["math".to_string(), "engines".to_string()],
        };

        let mut row: Row = note
            .to_fields()
            .unwrap()
            .into_iter()
            .map(|(field, value)| match value {
                Value::Bind(value) => (field, value),
                _ => (field, DatabaseValue::Null),
            })
            .collect();
        row.set("id", DatabaseValue::Int64(7));

        let decoded = Note::from_row(&row).unwrap();
        assert_eq!(decoded.id, Some(7));
        assert_eq!(decoded.title, note.title);
        assert_eq!(decoded.tags, note.tags);
    }
}
