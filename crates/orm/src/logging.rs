//! Database query log hook
//!
//! Every query a [`Database`](crate::connection::Database) executes is handed
//! to its [`QueryLogger`], if one is configured, before it reaches the
//! backend.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::backends::DatabaseValue;
use crate::connection::DatabaseId;

/// One executed statement
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseLog {
    pub database_id: DatabaseId,
    /// Backend-native statement text
    pub statement: String,
    pub bound_values: Vec<DatabaseValue>,
    pub timestamp: DateTime<Utc>,
}

impl DatabaseLog {
    pub fn new(database_id: DatabaseId, statement: String, bound_values: Vec<DatabaseValue>) -> Self {
        Self {
            database_id,
            statement,
            bound_values,
            timestamp: Utc::now(),
        }
    }
}

/// Receives database logs; what happens to them is up to the implementation
pub trait QueryLogger: Send + Sync {
    fn record(&self, log: DatabaseLog);
}

/// Emits each log as a `tracing` debug event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl QueryLogger for TracingLogger {
    fn record(&self, log: DatabaseLog) {
        let binds: Vec<String> = log.bound_values.iter().map(|v| v.to_string()).collect();
        tracing::debug!(
            database = %log.database_id,
            statement = %log.statement,
            binds = ?binds,
            timestamp = %log.timestamp.to_rfc3339(),
            "query"
        );
    }
}

/// Keeps every log in memory
#[derive(Debug, Default)]
pub struct MemoryLogger {
    logs: Mutex<Vec<DatabaseLog>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logs(&self) -> Vec<DatabaseLog> {
        self.logs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.logs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.logs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl QueryLogger for MemoryLogger {
    fn record(&self, log: DatabaseLog) {
        self.logs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(log);
    }
}
