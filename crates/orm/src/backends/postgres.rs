//! PostgreSQL Backend Implementation
//!
//! Queries are serialized with [`SqlSerializer`] and run over a single
//! sqlx [`PgConnection`]; pooling is done by [`ConnectionPool`](crate::connection::ConnectionPool),
//! not by sqlx.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Connection as _, Postgres, Row as _, TypeInfo, ValueRef};

use super::core::*;
use super::sql::SqlSerializer;
use crate::config::DatabaseConfig;
use crate::connection::{Connection, ConnectionFactory};
use crate::error::{ModelError, ModelResult, OrmResult};
use crate::query::DatabaseQuery;
use crate::schema::Schema;

/// Opens PostgreSQL sessions for a pool
#[derive(Debug, Clone)]
pub struct PostgresFactory {
    url: String,
}

impl PostgresFactory {
    /// Validate a `postgres://` URL; no connection is made until the pool asks
    pub fn new(url: &str) -> ModelResult<Self> {
        validate_database_url(url)?;
        Ok(Self { url: url.to_string() })
    }

    pub fn from_config(config: &DatabaseConfig) -> ModelResult<Self> {
        config.validate()?;
        Self::new(&config.url)
    }
}

#[async_trait]
impl ConnectionFactory for PostgresFactory {
    async fn connect(&self) -> OrmResult<Box<dyn Connection>> {
        let connection = PgConnection::connect(&self.url).await?;
        tracing::debug!("Opened PostgreSQL connection");
        Ok(Box::new(PostgresConnection::new(connection)))
    }

    fn capabilities(&self) -> BackendCapabilities {
        SqlDialect::PostgreSQL.capabilities()
    }
}

/// Check scheme, host and database name of a PostgreSQL URL
pub fn validate_database_url(url: &str) -> ModelResult<()> {
    let parsed = url::Url::parse(url)
        .map_err(|e| ModelError::Configuration(format!("Invalid database URL: {}", e)))?;

    if !matches!(parsed.scheme(), "postgres" | "postgresql") {
        return Err(ModelError::Configuration(format!(
            "Invalid PostgreSQL URL scheme '{}'",
            parsed.scheme()
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ModelError::Configuration("Missing host in database URL".to_string()));
    }
    if parsed.path().trim_start_matches('/').is_empty() {
        return Err(ModelError::Configuration("Missing database name in URL".to_string()));
    }
    Ok(())
}

/// PostgreSQL connection implementation
pub struct PostgresConnection {
    conn: Option<PgConnection>,
    serializer: SqlSerializer,
}

impl PostgresConnection {
    pub fn new(conn: PgConnection) -> Self {
        Self {
            conn: Some(conn),
            serializer: SqlSerializer::new(SqlDialect::PostgreSQL),
        }
    }

    fn conn(&mut self) -> ModelResult<&mut PgConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| ModelError::Database("connection is closed".to_string()))
    }

    async fn run(&mut self, sql: &str) -> ModelResult<()> {
        sqlx::query(sql).execute(self.conn()?).await?;
        Ok(())
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn execute(&mut self, query: &DatabaseQuery) -> OrmResult<Vec<Row>> {
        let statement = self.serializer.serialize(query)?;
        tracing::trace!("{}", statement.text);

        let mut sql_query = sqlx::query(&statement.text);
        for value in &statement.binds {
            sql_query = bind_database_value(sql_query, value);
        }

        let rows = sql_query.fetch_all(self.conn()?).await?;
        rows.iter().map(convert_row).collect()
    }

    async fn execute_schema(&mut self, schema: &Schema) -> OrmResult<()> {
        schema.check_capabilities(&self.capabilities())?;
        for statement in self.serializer.serialize_schema(schema)? {
            tracing::trace!("{}", statement);
            self.run(&statement).await?;
        }
        Ok(())
    }

    fn capabilities(&self) -> BackendCapabilities {
        SqlDialect::PostgreSQL.capabilities()
    }

    fn render(&self, query: &DatabaseQuery) -> OrmResult<Statement> {
        self.serializer.serialize(query)
    }

    async fn begin(&mut self) -> OrmResult<()> {
        self.run("BEGIN").await
    }

    async fn commit(&mut self) -> OrmResult<()> {
        self.run("COMMIT").await
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        self.run("ROLLBACK").await
    }

    async fn close(&mut self) -> OrmResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
        }
        Ok(())
    }
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &DatabaseValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int32(i) => query.bind(*i),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::Bytes(b) => query.bind(b.clone()),
        DatabaseValue::Uuid(u) => query.bind(*u),
        DatabaseValue::DateTime(dt) => query.bind(*dt),
        DatabaseValue::Json(j) => query.bind(j.clone()),
        DatabaseValue::Array(_) => query.bind(value.to_json()),
    }
}

fn convert_row(row: &PgRow) -> ModelResult<Row> {
    row.columns()
        .iter()
        .map(|column| {
            let value = postgres_value_to_database_value(row, column.ordinal())?;
            Ok((column.name().to_string(), value))
        })
        .collect()
}

/// Convert a PostgreSQL column value to DatabaseValue
fn postgres_value_to_database_value(row: &PgRow, index: usize) -> ModelResult<DatabaseValue> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let type_name = row.columns()[index].type_info().name();
    let value = match type_name {
        "BOOL" => DatabaseValue::Bool(row.try_get(index)?),
        "INT2" => DatabaseValue::Int32(i32::from(row.try_get::<i16, _>(index)?)),
        "INT4" => DatabaseValue::Int32(row.try_get(index)?),
        "INT8" => DatabaseValue::Int64(row.try_get(index)?),
        "FLOAT4" => DatabaseValue::Float64(f64::from(row.try_get::<f32, _>(index)?)),
        "FLOAT8" => DatabaseValue::Float64(row.try_get(index)?),
        "BYTEA" => DatabaseValue::Bytes(row.try_get(index)?),
        "UUID" => DatabaseValue::Uuid(row.try_get(index)?),
        "TIMESTAMPTZ" => DatabaseValue::DateTime(row.try_get(index)?),
        "TIMESTAMP" => {
            let naive: chrono::NaiveDateTime = row.try_get(index)?;
            DatabaseValue::DateTime(naive.and_utc())
        }
        "JSON" | "JSONB" => DatabaseValue::Json(row.try_get::<JsonValue, _>(index)?),
        _ => DatabaseValue::String(row.try_get(index).map_err(|e| {
            ModelError::Serialization(format!(
                "Failed to read column of type '{}' as text: {}",
                type_name, e
            ))
        })?),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_database_url() {
        assert!(validate_database_url("postgres://user:pw@localhost:5432/app").is_ok());
        assert!(validate_database_url("postgresql://localhost/app").is_ok());

        for url in [
            "mysql://localhost/app",
            "postgres://localhost",
            "postgres:///app",
            "not a url",
        ] {
            assert!(
                matches!(validate_database_url(url), Err(ModelError::Configuration(_))),
                "{} should be rejected",
                url
            );
        }
    }

    #[test]
    fn test_factory_declares_full_capabilities() {
        let factory = PostgresFactory::new("postgres://localhost/app").unwrap();
        assert_eq!(factory.capabilities(), BackendCapabilities::ALL);
    }
}
