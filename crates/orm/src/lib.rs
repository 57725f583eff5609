//! # quarry-orm: backend-agnostic ORM core
//!
//! Query IR and a fluent query builder, bounded connection pools keyed by
//! logical database, a schema IR with batched migrations, and backends that
//! execute it all: an in-memory engine and PostgreSQL over sqlx.
//!
//! ```no_run
//! use std::sync::Arc;
//! use quarry_orm::{Database, MemoryDatabase, PoolConfig};
//!
//! # fn main() -> quarry_orm::ModelResult<()> {
//! let database = Database::connect("main", Arc::new(MemoryDatabase::new()), PoolConfig::default())?;
//! # let _ = database;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod connection;
pub mod error;
pub mod event_error;
pub mod events;
pub mod logging;
pub mod migrations;
pub mod model;
pub mod observers;
pub mod query;
pub mod schema;

// Re-export core traits and types
pub use backends::{
    BackendCapabilities, DatabaseBackendType, DatabaseValue, MemoryDatabase, PostgresFactory, Row,
    SqlDialect, SqlSerializer, Statement,
};
pub use config::{DatabaseConfig, MigrationConfig, PoolConfig};
pub use connection::{
    Connection, ConnectionCache, ConnectionFactory, ConnectionPool, Database, DatabaseId, Databases,
    PoolStats, PooledConnection,
};
pub use error::*;
pub use event_error::EventError;
pub use events::ModelObserver;
pub use logging::{DatabaseLog, MemoryLogger, QueryLogger, TracingLogger};
pub use migrations::{Migration, MigrationRunResult, MigrationStatus, Migrations, Migrator, RollbackResult};
pub use model::Model;
pub use query::{
    Children, DatabaseQuery, Filter, FilterMethod, OrderDirection, Parent, QueryAction, QueryBuilder,
    Relation, Value,
};
pub use schema::{DataType, FieldConstraint, OnDelete, Schema, SchemaBuilder};
