//! Schema IR - backend-agnostic description of a DDL operation

use std::fmt;

use crate::backends::{BackendCapabilities, DatabaseValue};
use crate::error::{ModelError, ModelResult};

/// Column types understood by every backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Int,
    BigInt,
    Float,
    Bool,
    /// Variable-length string with an optional maximum length
    String(Option<u32>),
    Text,
    Timestamp,
    Uuid,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldConstraint {
    NotNull,
    Unique,
    Default(DatabaseValue),
    /// Primary key; `auto_increment` asks the backend to assign values
    Identifier { auto_increment: bool },
}

/// A single column of an entity
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub data_type: DataType,
    pub constraints: Vec<FieldConstraint>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            constraints: Vec::new(),
        }
    }

    pub fn not_null(mut self) -> Self {
        self.constraints.push(FieldConstraint::NotNull);
        self
    }

    pub fn unique(mut self) -> Self {
        self.constraints.push(FieldConstraint::Unique);
        self
    }

    pub fn default_value(mut self, value: impl Into<DatabaseValue>) -> Self {
        self.constraints.push(FieldConstraint::Default(value.into()));
        self
    }

    pub fn primary(mut self, auto_increment: bool) -> Self {
        self.constraints
            .push(FieldConstraint::Identifier { auto_increment });
        self
    }

    /// `Some(auto_increment)` when this field is the entity identifier
    pub fn identifier(&self) -> Option<bool> {
        self.constraints.iter().find_map(|constraint| match constraint {
            FieldConstraint::Identifier { auto_increment } => Some(*auto_increment),
            _ => None,
        })
    }

    pub fn is_identifier(&self) -> bool {
        self.identifier().is_some()
    }

    pub fn is_unique(&self) -> bool {
        self.constraints.contains(&FieldConstraint::Unique) || self.is_identifier()
    }

    pub fn is_not_null(&self) -> bool {
        self.constraints.contains(&FieldConstraint::NotNull)
    }

    pub fn default(&self) -> Option<&DatabaseValue> {
        self.constraints.iter().find_map(|constraint| match constraint {
            FieldConstraint::Default(value) => Some(value),
            _ => None,
        })
    }
}

/// Index over one or more fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    /// Explicit name; derived from entity and fields when absent
    pub name: Option<String>,
    pub fields: Vec<String>,
    pub unique: bool,
}

impl Index {
    pub fn new(fields: &[&str]) -> Self {
        Self {
            name: None,
            fields: fields.iter().map(|f| f.to_string()).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self, entity: &str) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("idx_{}_{}", entity, self.fields.join("_")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnDelete {
    Cascade,
    SetNull,
    Restrict,
    #[default]
    NoAction,
}

impl fmt::Display for OnDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnDelete::Cascade => write!(f, "CASCADE"),
            OnDelete::SetNull => write!(f, "SET NULL"),
            OnDelete::Restrict => write!(f, "RESTRICT"),
            OnDelete::NoAction => write!(f, "NO ACTION"),
        }
    }
}

/// Foreign key from a local field to a field of another entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub local_field: String,
    pub foreign_entity: String,
    pub foreign_field: String,
    pub on_delete: OnDelete,
}

impl Reference {
    pub fn new(
        local_field: impl Into<String>,
        foreign_entity: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            local_field: local_field.into(),
            foreign_entity: foreign_entity.into(),
            foreign_field: foreign_field.into(),
            on_delete: OnDelete::default(),
        }
    }

    pub fn on_delete(mut self, on_delete: OnDelete) -> Self {
        self.on_delete = on_delete;
        self
    }

    /// Constraint name, unique per entity and local field
    pub fn name(&self, entity: &str) -> String {
        format!("fk_{}_{}", entity, self.local_field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaAction {
    Create,
    Update,
    Delete,
}

impl fmt::Display for SchemaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaAction::Create => write!(f, "CREATE"),
            SchemaAction::Update => write!(f, "UPDATE"),
            SchemaAction::Delete => write!(f, "DELETE"),
        }
    }
}

/// A schema change against one entity
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub entity: String,
    pub action: SchemaAction,
    pub add_fields: Vec<FieldDefinition>,
    pub remove_fields: Vec<String>,
    pub add_indexes: Vec<Index>,
    pub remove_indexes: Vec<Index>,
    pub add_references: Vec<Reference>,
    pub remove_references: Vec<Reference>,
}

impl Schema {
    pub fn new(entity: impl Into<String>, action: SchemaAction) -> Self {
        Self {
            entity: entity.into(),
            action,
            add_fields: Vec::new(),
            remove_fields: Vec::new(),
            add_indexes: Vec::new(),
            remove_indexes: Vec::new(),
            add_references: Vec::new(),
            remove_references: Vec::new(),
        }
    }

    /// Reject index or reference changes the backend cannot carry out
    pub fn check_capabilities(&self, capabilities: &BackendCapabilities) -> ModelResult<()> {
        let touches_indexes = !self.add_indexes.is_empty() || !self.remove_indexes.is_empty();
        if touches_indexes && !capabilities.indexes {
            return Err(ModelError::Unsupported(format!(
                "indexes on '{}': backend has no index support",
                self.entity
            )));
        }

        let touches_references =
            !self.add_references.is_empty() || !self.remove_references.is_empty();
        if touches_references && !capabilities.references {
            return Err(ModelError::Unsupported(format!(
                "references on '{}': backend has no foreign key support",
                self.entity
            )));
        }

        let structured = self
            .add_fields
            .iter()
            .any(|field| field.data_type == DataType::Json);
        if structured && !capabilities.structured_values {
            return Err(ModelError::Serialization(format!(
                "'{}' declares a JSON field but the backend stores flat rows only",
                self.entity
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_constraints() {
        let field = FieldDefinition::new("email", DataType::String(Some(255)))
            .not_null()
            .unique();
        assert!(field.is_not_null());
        assert!(field.is_unique());
        assert!(!field.is_identifier());

        let id = FieldDefinition::new("id", DataType::BigInt).primary(true);
        assert_eq!(id.identifier(), Some(true));
        assert!(id.is_unique());
    }

    #[test]
    fn test_capability_check() {
        let mut schema = Schema::new("posts", SchemaAction::Create);
        schema.add_indexes.push(Index::new(&["title"]));

        let no_indexes = BackendCapabilities {
            indexes: false,
            ..BackendCapabilities::ALL
        };
        assert!(matches!(
            schema.check_capabilities(&no_indexes),
            Err(ModelError::Unsupported(_))
        ));
        assert!(schema.check_capabilities(&BackendCapabilities::ALL).is_ok());
    }

    #[test]
    fn test_derived_names() {
        assert_eq!(Index::new(&["a", "b"]).name("t"), "idx_t_a_b");
        assert_eq!(Index::new(&["a"]).named("custom").name("t"), "custom");
        assert_eq!(Reference::new("user_id", "users", "id").name("posts"), "fk_posts_user_id");
    }
}
