//! SQL serialization of the query and schema IR
//!
//! Values never end up inside the SQL text: each one becomes a placeholder
//! and travels in [`Statement::binds`]. Identifiers are quoted with the
//! dialect's quote character. The only literals written inline are LIMIT /
//! OFFSET numbers and column DEFAULTs in DDL, where placeholders are not
//! accepted.

use crate::error::{ModelError, ModelResult};
use crate::query::types::*;
use crate::schema::{DataType, FieldConstraint, FieldDefinition, Reference, Schema, SchemaAction};

use super::core::{DatabaseValue, SqlDialect, Statement};

/// Translates [`DatabaseQuery`] and [`Schema`] into dialect-specific SQL
#[derive(Debug, Clone, Copy)]
pub struct SqlSerializer {
    dialect: SqlDialect,
}

impl SqlSerializer {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Serialize a query into parameterized SQL
    pub fn serialize(&self, query: &DatabaseQuery) -> ModelResult<Statement> {
        let mut writer = SqlWriter::new(self.dialect);
        match query.action {
            QueryAction::Create => writer.insert(query)?,
            QueryAction::Read => writer.select(query)?,
            QueryAction::Update => writer.update(query)?,
            QueryAction::Delete => writer.delete(query)?,
        }
        Ok(writer.finish())
    }

    /// Serialize a schema change into one or more DDL statements
    pub fn serialize_schema(&self, schema: &Schema) -> ModelResult<Vec<String>> {
        let d = self.dialect;
        let table = d.quote_identifier(&schema.entity);
        let mut statements = Vec::new();

        match schema.action {
            SchemaAction::Create => {
                let mut parts: Vec<String> = schema
                    .add_fields
                    .iter()
                    .map(|field| self.column_definition(field))
                    .collect::<ModelResult<_>>()?;
                parts.extend(
                    schema
                        .add_references
                        .iter()
                        .map(|r| self.reference_clause(&schema.entity, r)),
                );
                statements.push(format!("CREATE TABLE {} ({})", table, parts.join(", ")));
            }
            SchemaAction::Update => {
                for field in &schema.add_fields {
                    statements.push(format!(
                        "ALTER TABLE {} ADD COLUMN {}",
                        table,
                        self.column_definition(field)?
                    ));
                }
                for field in &schema.remove_fields {
                    statements.push(format!(
                        "ALTER TABLE {} DROP COLUMN {}",
                        table,
                        d.quote_identifier(field)
                    ));
                }
                for reference in &schema.add_references {
                    statements.push(format!(
                        "ALTER TABLE {} ADD {}",
                        table,
                        self.reference_clause(&schema.entity, reference)
                    ));
                }
                for reference in &schema.remove_references {
                    let keyword = match d {
                        SqlDialect::MySQL => "FOREIGN KEY",
                        _ => "CONSTRAINT",
                    };
                    statements.push(format!(
                        "ALTER TABLE {} DROP {} {}",
                        table,
                        keyword,
                        d.quote_identifier(&reference.name(&schema.entity))
                    ));
                }
            }
            SchemaAction::Delete => {
                statements.push(format!("DROP TABLE {}", table));
                return Ok(statements);
            }
        }

        for index in &schema.add_indexes {
            let columns: Vec<String> = index.fields.iter().map(|f| d.quote_identifier(f)).collect();
            statements.push(format!(
                "CREATE {}INDEX {} ON {} ({})",
                if index.unique { "UNIQUE " } else { "" },
                d.quote_identifier(&index.name(&schema.entity)),
                table,
                columns.join(", ")
            ));
        }
        for index in &schema.remove_indexes {
            let name = d.quote_identifier(&index.name(&schema.entity));
            statements.push(match d {
                SqlDialect::MySQL => format!("DROP INDEX {} ON {}", name, table),
                _ => format!("DROP INDEX {}", name),
            });
        }

        Ok(statements)
    }

    fn column_definition(&self, field: &FieldDefinition) -> ModelResult<String> {
        let d = self.dialect;
        let name = d.quote_identifier(&field.name);

        if let Some(auto_increment) = field.identifier() {
            if auto_increment {
                return Ok(match d {
                    SqlDialect::PostgreSQL => format!("{} BIGSERIAL PRIMARY KEY", name),
                    SqlDialect::MySQL => format!("{} BIGINT AUTO_INCREMENT PRIMARY KEY", name),
                    SqlDialect::SQLite => format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", name),
                });
            }
        }

        let mut definition = format!("{} {}", name, self.data_type(&field.data_type));
        for constraint in &field.constraints {
            match constraint {
                FieldConstraint::Identifier { .. } => definition.push_str(" PRIMARY KEY"),
                FieldConstraint::NotNull => definition.push_str(" NOT NULL"),
                FieldConstraint::Unique => definition.push_str(" UNIQUE"),
                FieldConstraint::Default(value) => {
                    definition.push_str(" DEFAULT ");
                    definition.push_str(&self.literal(value)?);
                }
            }
        }
        Ok(definition)
    }

    fn reference_clause(&self, entity: &str, reference: &Reference) -> String {
        let d = self.dialect;
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
            d.quote_identifier(&reference.name(entity)),
            d.quote_identifier(&reference.local_field),
            d.quote_identifier(&reference.foreign_entity),
            d.quote_identifier(&reference.foreign_field),
            reference.on_delete
        )
    }

    fn data_type(&self, data_type: &DataType) -> String {
        use SqlDialect::*;

        match (data_type, self.dialect) {
            (DataType::Int, _) => "INTEGER".to_string(),
            (DataType::BigInt, _) => "BIGINT".to_string(),
            (DataType::Float, PostgreSQL) => "DOUBLE PRECISION".to_string(),
            (DataType::Float, MySQL) => "DOUBLE".to_string(),
            (DataType::Float, SQLite) => "REAL".to_string(),
            (DataType::Bool, _) => "BOOLEAN".to_string(),
            (DataType::String(Some(length)), _) => format!("VARCHAR({})", length),
            (DataType::String(None), _) | (DataType::Text, _) => "TEXT".to_string(),
            (DataType::Timestamp, PostgreSQL) => "TIMESTAMPTZ".to_string(),
            (DataType::Timestamp, _) => "DATETIME".to_string(),
            (DataType::Uuid, PostgreSQL) => "UUID".to_string(),
            (DataType::Uuid, MySQL) => "CHAR(36)".to_string(),
            (DataType::Uuid, SQLite) => "TEXT".to_string(),
            (DataType::Json, PostgreSQL) => "JSONB".to_string(),
            (DataType::Json, MySQL) => "JSON".to_string(),
            (DataType::Json, SQLite) => "TEXT".to_string(),
        }
    }

    fn literal(&self, value: &DatabaseValue) -> ModelResult<String> {
        Ok(match value {
            DatabaseValue::Null => "NULL".to_string(),
            DatabaseValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            DatabaseValue::Int32(i) => i.to_string(),
            DatabaseValue::Int64(i) => i.to_string(),
            DatabaseValue::Float64(f) => f.to_string(),
            DatabaseValue::String(s) => format!("'{}'", s.replace('\'', "''")),
            DatabaseValue::Uuid(u) => format!("'{}'", u),
            DatabaseValue::DateTime(dt) => format!("'{}'", dt.to_rfc3339()),
            other => {
                return Err(ModelError::Serialization(format!(
                    "{} cannot be used as a column default",
                    other
                )))
            }
        })
    }
}

/// Accumulates SQL text and the values bound to it
struct SqlWriter {
    dialect: SqlDialect,
    sql: String,
    binds: Vec<DatabaseValue>,
}

impl SqlWriter {
    fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            binds: Vec::new(),
        }
    }

    fn finish(self) -> Statement {
        Statement {
            text: self.sql,
            binds: self.binds,
        }
    }

    fn quote(&self, identifier: &str) -> String {
        self.dialect.quote_identifier(identifier)
    }

    fn bind(&mut self, value: DatabaseValue) -> ModelResult<()> {
        if value.is_structured() && !self.dialect.supports_json() {
            return Err(ModelError::Serialization(format!(
                "{:?} cannot store structured value {}",
                self.dialect, value
            )));
        }
        let placeholder = self.dialect.parameter_placeholder(self.binds.len());
        self.sql.push_str(&placeholder);
        self.binds.push(value);
        Ok(())
    }

    /// Bind an input value; nested groups have no flat-row representation
    fn bind_input(&mut self, field: &str, value: &Value) -> ModelResult<()> {
        match value {
            Value::Null => {
                self.sql.push_str("NULL");
                Ok(())
            }
            Value::Bind(value) => self.bind(value.clone()),
            Value::Group(_) => Err(ModelError::Serialization(format!(
                "Field '{}' holds a nested group; {:?} rows are flat",
                field, self.dialect
            ))),
        }
    }

    fn returning(&mut self) {
        if self.dialect.supports_returning() {
            self.sql.push_str(" RETURNING *");
        }
    }

    fn insert(&mut self, query: &DatabaseQuery) -> ModelResult<()> {
        if query.input.is_empty() {
            return Err(ModelError::Serialization(format!(
                "Create on '{}' requires at least one input row",
                query.entity
            )));
        }

        let mut columns: Vec<&str> = Vec::new();
        for row in &query.input {
            for (field, _) in row {
                if !columns.contains(&field.as_str()) {
                    columns.push(field);
                }
            }
        }

        let quoted: Vec<String> = columns.iter().map(|c| self.quote(c)).collect();
        self.sql = format!("INSERT INTO {} ({}) VALUES ", self.quote(&query.entity), quoted.join(", "));

        for (row_index, row) in query.input.iter().enumerate() {
            if row_index > 0 {
                self.sql.push_str(", ");
            }
            self.sql.push('(');
            for (column_index, column) in columns.iter().enumerate() {
                if column_index > 0 {
                    self.sql.push_str(", ");
                }
                match row.iter().find(|(field, _)| field == column) {
                    Some((field, value)) => self.bind_input(field, value)?,
                    None => self.sql.push_str("DEFAULT"),
                }
            }
            self.sql.push(')');
        }

        self.returning();
        Ok(())
    }

    fn select(&mut self, query: &DatabaseQuery) -> ModelResult<()> {
        let projection = match query.aggregate {
            Some(Aggregate::Count) => format!("COUNT(*) AS {}", self.quote(AGGREGATE_COLUMN)),
            None if query.fields.is_empty() => "*".to_string(),
            None => query
                .fields
                .iter()
                .map(|field| self.quote(field))
                .collect::<Vec<_>>()
                .join(", "),
        };
        self.sql = format!("SELECT {} FROM {}", projection, self.quote(&query.entity));

        for join in &query.joins {
            let clause = format!(
                " {} {} ON {} = {}",
                join.method,
                self.quote(&join.joined_field.entity),
                self.quote(&join.base_field.qualified()),
                self.quote(&join.joined_field.qualified())
            );
            self.sql.push_str(&clause);
        }

        self.where_clause(&query.filters)?;

        if !query.sorts.is_empty() && query.aggregate.is_none() {
            let sorts: Vec<String> = query
                .sorts
                .iter()
                .map(|sort| format!("{} {}", self.quote(&sort.field), sort.direction))
                .collect();
            self.sql.push_str(" ORDER BY ");
            self.sql.push_str(&sorts.join(", "));
        }

        if let Some(limit) = query.limit {
            self.sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = query.offset {
            if query.limit.is_none() && self.dialect != SqlDialect::PostgreSQL {
                // MySQL and SQLite reject OFFSET without LIMIT
                self.sql.push_str(match self.dialect {
                    SqlDialect::MySQL => " LIMIT 18446744073709551615",
                    _ => " LIMIT -1",
                });
            }
            self.sql.push_str(&format!(" OFFSET {}", offset));
        }
        Ok(())
    }

    fn update(&mut self, query: &DatabaseQuery) -> ModelResult<()> {
        let row = query.input.first().filter(|row| !row.is_empty()).ok_or_else(|| {
            ModelError::Serialization(format!(
                "Update on '{}' requires at least one field to set",
                query.entity
            ))
        })?;

        self.sql = format!("UPDATE {} SET ", self.quote(&query.entity));
        for (index, (field, value)) in row.iter().enumerate() {
            if index > 0 {
                self.sql.push_str(", ");
            }
            let column = self.quote(field);
            self.sql.push_str(&column);
            self.sql.push_str(" = ");
            self.bind_input(field, value)?;
        }

        self.where_clause(&query.filters)?;
        self.returning();
        Ok(())
    }

    fn delete(&mut self, query: &DatabaseQuery) -> ModelResult<()> {
        self.sql = format!("DELETE FROM {}", self.quote(&query.entity));
        self.where_clause(&query.filters)?;
        self.returning();
        Ok(())
    }

    fn where_clause(&mut self, filters: &[Filter]) -> ModelResult<()> {
        if filters.is_empty() {
            return Ok(());
        }
        self.sql.push_str(" WHERE ");
        for (index, filter) in filters.iter().enumerate() {
            if index > 0 {
                self.sql.push_str(" AND ");
            }
            self.filter(filter)?;
        }
        Ok(())
    }

    fn filter(&mut self, filter: &Filter) -> ModelResult<()> {
        match filter {
            Filter::Group { filters, relation } => {
                if filters.is_empty() {
                    self.sql.push_str(match relation {
                        Relation::And => "1 = 1",
                        Relation::Or => "1 = 0",
                    });
                    return Ok(());
                }
                self.sql.push('(');
                for (index, filter) in filters.iter().enumerate() {
                    if index > 0 {
                        self.sql.push_str(&format!(" {} ", relation));
                    }
                    self.filter(filter)?;
                }
                self.sql.push(')');
                Ok(())
            }
            Filter::Basic { field, method, value } => self.basic_filter(field, *method, value),
        }
    }

    fn basic_filter(&mut self, field: &str, method: FilterMethod, value: &Value) -> ModelResult<()> {
        let column = self.quote(field);

        match method {
            FilterMethod::Equality { inverse } => match value {
                Value::Null => {
                    let test = if inverse { "IS NOT NULL" } else { "IS NULL" };
                    self.sql.push_str(&format!("{} {}", column, test));
                }
                _ => {
                    self.sql.push_str(&format!("{} {} ", column, method));
                    self.scalar(field, value)?;
                }
            },
            FilterMethod::Order { .. } => {
                self.sql.push_str(&format!("{} {} ", column, method));
                self.scalar(field, value)?;
            }
            FilterMethod::Subset { inverse } => {
                let values = match value {
                    Value::Group(values) => values.clone(),
                    Value::Bind(DatabaseValue::Array(values)) => {
                        values.iter().cloned().map(Value::Bind).collect()
                    }
                    other => vec![other.clone()],
                };
                if values.is_empty() {
                    self.sql.push_str(if inverse { "1 = 1" } else { "1 = 0" });
                    return Ok(());
                }
                self.sql.push_str(&format!("{} {} (", column, method));
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        self.sql.push_str(", ");
                    }
                    self.scalar(field, value)?;
                }
                self.sql.push(')');
            }
            FilterMethod::Contains { inverse, position } => {
                let needle = match value {
                    Value::Bind(DatabaseValue::String(s)) => s.clone(),
                    other => {
                        return Err(ModelError::Serialization(format!(
                            "Pattern filter on '{}' requires a string, got {}",
                            field, other
                        )))
                    }
                };
                let escaped = needle
                    .replace('\\', "\\\\")
                    .replace('%', "\\%")
                    .replace('_', "\\_");
                let pattern = match position {
                    ContainsPosition::Prefix => format!("{}%", escaped),
                    ContainsPosition::Suffix => format!("%{}", escaped),
                    ContainsPosition::Anywhere => format!("%{}%", escaped),
                };
                let operator = if inverse { "NOT LIKE" } else { "LIKE" };
                self.sql.push_str(&format!("{} {} ", column, operator));
                self.bind(DatabaseValue::String(pattern))?;
                // MySQL reads backslashes inside string literals as escapes
                self.sql.push_str(match self.dialect {
                    SqlDialect::MySQL => " ESCAPE '\\\\'",
                    SqlDialect::PostgreSQL | SqlDialect::SQLite => " ESCAPE '\\'",
                });
            }
        }
        Ok(())
    }

    fn scalar(&mut self, field: &str, value: &Value) -> ModelResult<()> {
        match value {
            Value::Bind(value) => self.bind(value.clone()),
            Value::Null => {
                self.sql.push_str("NULL");
                Ok(())
            }
            Value::Group(_) => Err(ModelError::Serialization(format!(
                "Filter on '{}' expects a single value, got a group",
                field
            ))),
        }
    }
}
