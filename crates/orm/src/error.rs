//! Error types for the ORM system
//!
//! Every fallible operation in the crate returns [`ModelError`]. Backend
//! errors are carried through unchanged in [`ModelError::Database`]; the
//! pool has its own [`PoolError`] so callers can tell resource contention
//! apart from real failures.

use crate::event_error::EventError;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ORM error type alias
pub type OrmError = ModelError;

/// ORM result type alias
pub type OrmResult<T> = ModelResult<T>;

/// Error types for ORM operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    /// No database registered for a logical identifier, or invalid settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Update or delete attempted on a model without an identifier
    #[error("Identifier required: model '{entity}' has no primary key value")]
    MissingPrimaryKey { entity: String },

    /// Error reported by the backend, message kept as-is
    #[error("Database error: {0}")]
    Database(String),

    /// Connection pool failure
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Migration prepare/revert failure
    #[error("Migration '{name}' failed: {message}")]
    Migration { name: String, message: String },

    /// Value cannot be encoded for, or decoded from, the backend row shape
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend lacks the capability the operation needs
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A lifecycle observer rejected the operation
    #[error(transparent)]
    Event(#[from] EventError),

    /// The entity (table) a statement names does not exist
    #[error("Entity does not exist: {0}")]
    UnknownEntity(String),

    /// Record not found in the given entity
    #[error("Record not found in entity '{0}'")]
    NotFound(String),
}

impl ModelError {
    /// Whether the caller may retry the operation after backing off
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModelError::Pool(PoolError::Exhausted { .. }) | ModelError::Pool(PoolError::Timeout { .. })
        )
    }

    pub(crate) fn migration(name: &str, err: ModelError) -> Self {
        ModelError::Migration {
            name: name.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            // undefined_table
            sqlx::Error::Database(db) if db.code().as_deref() == Some("42P01") => {
                ModelError::UnknownEntity(db.message().to_string())
            }
            _ => ModelError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

/// Database connection pool error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("Pool '{database}' is closed")]
    Closed { database: String },

    #[error("Connection acquisition on '{database}' timed out after {timeout_ms}ms")]
    Timeout { database: String, timeout_ms: u64 },

    #[error("Pool '{database}' exhausted: all {max_connections} connections in use")]
    Exhausted {
        database: String,
        max_connections: usize,
    },

    #[error("Connection was not handed out by pool '{database}'")]
    ForeignConnection { database: String },
}
