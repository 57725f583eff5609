//! Database Backend Abstractions
//!
//! Backends receive the query IR and the schema IR and execute them: the
//! in-memory engine interprets them directly, PostgreSQL goes through the
//! SQL serializer first.

pub mod core;
pub mod memory;
pub mod postgres;
pub mod sql;

// Re-export core traits and types
pub use core::*;
pub use memory::{MemoryConnection, MemoryDatabase};
pub use postgres::{PostgresConnection, PostgresFactory};
pub use sql::SqlSerializer;

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    Memory,
    PostgreSQL,
}

impl DatabaseBackendType {
    /// Pick the backend from a database URL's scheme
    pub fn from_url(url: &str) -> crate::error::ModelResult<Self> {
        let scheme = url.split_once("://").map(|(scheme, _)| scheme).unwrap_or(url);
        scheme
            .parse()
            .map_err(crate::error::ModelError::Configuration)
    }
}

impl std::fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackendType::Memory => write!(f, "memory"),
            DatabaseBackendType::PostgreSQL => write!(f, "postgresql"),
        }
    }
}

impl std::str::FromStr for DatabaseBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(DatabaseBackendType::Memory),
            "postgresql" | "postgres" => Ok(DatabaseBackendType::PostgreSQL),
            _ => Err(format!("Unsupported database backend: {}", s)),
        }
    }
}
