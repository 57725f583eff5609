//! Migration Definitions - Core types and structures for migrations
//!
//! A migration is a named pair of schema operations: `prepare` moves the
//! database forward, `revert` undoes it. Applied migrations are recorded in
//! the log entity as [`MigrationRecord`]s.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::connection::{Connection, DatabaseId};
use crate::error::ModelResult;

/// A named, reversible unit of schema change
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique name within the target database; recorded in the log
    fn name(&self) -> &str;

    async fn prepare(&self, conn: &mut dyn Connection) -> ModelResult<()>;

    async fn revert(&self, conn: &mut dyn Connection) -> ModelResult<()>;
}

/// Migration status in the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub id: i64,
    pub name: String,
    /// Batch number (for grouping migrations)
    pub batch: i64,
    pub applied_at: DateTime<Utc>,
}

/// Result of running migrations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationRunResult {
    /// Names of migrations that were applied, in order
    pub applied_migrations: Vec<String>,
    /// Number of migrations that were skipped (already applied)
    pub skipped_count: usize,
    /// Batch the applied migrations were recorded under, if any ran
    pub batch: Option<i64>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl MigrationRunResult {
    pub fn applied_count(&self) -> usize {
        self.applied_migrations.len()
    }
}

/// Result of rolling back migrations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollbackResult {
    /// Names of migrations that were reverted, in revert order
    pub rolled_back_migrations: Vec<String>,
    /// Batches that were reverted, newest first
    pub batches: Vec<i64>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl RollbackResult {
    pub fn rolled_back_count(&self) -> usize {
        self.rolled_back_migrations.len()
    }

    pub(crate) fn absorb(&mut self, other: RollbackResult) {
        self.rolled_back_migrations.extend(other.rolled_back_migrations);
        self.batches.extend(other.batches);
    }
}

/// Migration status in the system
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStatus {
    /// Migration is pending (not yet applied)
    Pending,
    /// Migration has been applied
    Applied {
        /// When it was applied
        applied_at: DateTime<Utc>,
        /// Batch number
        batch: i64,
    },
}

/// Status line for one registered migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationState {
    pub name: String,
    pub database: DatabaseId,
    pub status: MigrationStatus,
}
