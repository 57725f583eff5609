//! Schema Builder - DSL for schema changes used by migrations
//!
//! ```ignore
//! SchemaBuilder::create("users")
//!     .id()
//!     .string("name", Some(100), true)
//!     .timestamps()
//!     .run(conn)
//!     .await?;
//! ```

use crate::connection::Connection;
use crate::error::ModelResult;

use super::definitions::*;

/// Fluent builder for a single [`Schema`]
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    /// Create a new entity
    pub fn create(entity: &str) -> Self {
        Self {
            schema: Schema::new(entity, SchemaAction::Create),
        }
    }

    /// Alter an existing entity
    pub fn update(entity: &str) -> Self {
        Self {
            schema: Schema::new(entity, SchemaAction::Update),
        }
    }

    /// Drop an entity
    pub fn delete(entity: &str) -> Self {
        Self {
            schema: Schema::new(entity, SchemaAction::Delete),
        }
    }

    /// Auto-incrementing `id` identifier
    pub fn id(self) -> Self {
        self.add_field(FieldDefinition::new("id", DataType::BigInt).primary(true))
    }

    /// UUID `id` identifier assigned by the caller
    pub fn uuid_id(self) -> Self {
        self.add_field(FieldDefinition::new("id", DataType::Uuid).primary(false))
    }

    pub fn field(self, name: &str, data_type: DataType, constraints: &[FieldConstraint]) -> Self {
        let mut field = FieldDefinition::new(name, data_type);
        field.constraints.extend_from_slice(constraints);
        self.add_field(field)
    }

    pub fn add_field(mut self, field: FieldDefinition) -> Self {
        self.schema.add_fields.push(field);
        self
    }

    fn typed(self, name: &str, data_type: DataType, not_null: bool) -> Self {
        let field = FieldDefinition::new(name, data_type);
        self.add_field(if not_null { field.not_null() } else { field })
    }

    pub fn integer(self, name: &str, not_null: bool) -> Self {
        self.typed(name, DataType::Int, not_null)
    }

    pub fn big_int(self, name: &str, not_null: bool) -> Self {
        self.typed(name, DataType::BigInt, not_null)
    }

    pub fn float(self, name: &str, not_null: bool) -> Self {
        self.typed(name, DataType::Float, not_null)
    }

    pub fn boolean(self, name: &str, not_null: bool) -> Self {
        self.typed(name, DataType::Bool, not_null)
    }

    pub fn string(self, name: &str, length: Option<u32>, not_null: bool) -> Self {
        self.typed(name, DataType::String(length), not_null)
    }

    pub fn text(self, name: &str, not_null: bool) -> Self {
        self.typed(name, DataType::Text, not_null)
    }

    pub fn timestamp(self, name: &str, not_null: bool) -> Self {
        self.typed(name, DataType::Timestamp, not_null)
    }

    pub fn uuid(self, name: &str, not_null: bool) -> Self {
        self.typed(name, DataType::Uuid, not_null)
    }

    pub fn json(self, name: &str, not_null: bool) -> Self {
        self.typed(name, DataType::Json, not_null)
    }

    /// Nullable `created_at` and `updated_at` columns
    pub fn timestamps(self) -> Self {
        self.timestamp("created_at", false)
            .timestamp("updated_at", false)
    }

    /// Nullable `deleted_at` column
    pub fn soft_deletes(self) -> Self {
        self.timestamp("deleted_at", false)
    }

    pub fn remove_field(mut self, name: &str) -> Self {
        self.schema.remove_fields.push(name.to_string());
        self
    }

    pub fn index(mut self, fields: &[&str]) -> Self {
        self.schema.add_indexes.push(Index::new(fields));
        self
    }

    pub fn unique_index(mut self, fields: &[&str]) -> Self {
        self.schema.add_indexes.push(Index::new(fields).unique());
        self
    }

    pub fn remove_index(mut self, index: Index) -> Self {
        self.schema.remove_indexes.push(index);
        self
    }

    pub fn reference(
        mut self,
        local_field: &str,
        foreign_entity: &str,
        foreign_field: &str,
        on_delete: OnDelete,
    ) -> Self {
        self.schema.add_references.push(
            Reference::new(local_field, foreign_entity, foreign_field).on_delete(on_delete),
        );
        self
    }

    pub fn remove_reference(mut self, local_field: &str, foreign_entity: &str, foreign_field: &str) -> Self {
        self.schema
            .remove_references
            .push(Reference::new(local_field, foreign_entity, foreign_field));
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn into_schema(self) -> Schema {
        self.schema
    }

    /// Execute the schema change on a connection
    pub async fn run(self, conn: &mut dyn Connection) -> ModelResult<()> {
        self.schema.check_capabilities(&conn.capabilities())?;
        tracing::debug!(
            "Running schema {} on '{}'",
            self.schema.action,
            self.schema.entity
        );
        conn.execute_schema(&self.schema).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::DatabaseValue;

    #[test]
    fn test_builder_collects_changes() {
        let schema = SchemaBuilder::create("users")
            .id()
            .string("name", Some(100), true)
            .timestamps()
            .soft_deletes()
            .unique_index(&["name"])
            .into_schema();

        assert_eq!(schema.action, SchemaAction::Create);
        let names: Vec<&str> = schema.add_fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "created_at", "updated_at", "deleted_at"]);
        assert!(schema.add_fields[0].is_identifier());
        assert!(schema.add_fields[1].is_not_null());
        assert!(schema.add_indexes[0].unique);
    }

    #[test]
    fn test_field_with_constraint_list() {
        let schema = SchemaBuilder::update("users")
            .field(
                "role",
                DataType::String(Some(20)),
                &[FieldConstraint::NotNull, FieldConstraint::Default("member".into())],
            )
            .remove_field("nickname")
            .into_schema();

        assert_eq!(
            schema.add_fields[0].default(),
            Some(&DatabaseValue::from("member"))
        );
        assert_eq!(schema.remove_fields, vec!["nickname".to_string()]);
    }
}
