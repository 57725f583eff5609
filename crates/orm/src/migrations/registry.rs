//! Registered migrations, in registration order

use std::fmt;
use std::sync::Arc;

use super::definitions::Migration;
use crate::connection::DatabaseId;
use crate::error::{ModelError, ModelResult};

/// A migration bound to the database it runs on
#[derive(Clone)]
pub struct RegisteredMigration {
    pub migration: Arc<dyn Migration>,
    pub database: DatabaseId,
}

impl RegisteredMigration {
    pub fn name(&self) -> &str {
        self.migration.name()
    }
}

impl fmt::Debug for RegisteredMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredMigration")
            .field("name", &self.name())
            .field("database", &self.database)
            .finish()
    }
}

/// Ordered set of migrations; names are unique per database
#[derive(Debug, Clone, Default)]
pub struct Migrations {
    entries: Vec<RegisteredMigration>,
}

impl Migrations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `migration` to run on `database`, after everything already
    /// registered
    pub fn add(&mut self, migration: impl Migration + 'static, database: impl Into<DatabaseId>) -> ModelResult<()> {
        let database = database.into();
        if self.entries.iter().any(|entry| entry.database == database && entry.name() == migration.name()) {
            return Err(ModelError::Configuration(format!(
                "Migration '{}' is already registered for database '{}'",
                migration.name(),
                database
            )));
        }
        self.entries.push(RegisteredMigration {
            migration: Arc::new(migration),
            database,
        });
        Ok(())
    }

    /// Register on the default database
    pub fn add_default(&mut self, migration: impl Migration + 'static) -> ModelResult<()> {
        self.add(migration, DatabaseId::default())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredMigration> {
        self.entries.iter()
    }

    /// Databases with at least one migration, in order of first registration
    pub fn databases(&self) -> Vec<DatabaseId> {
        let mut databases: Vec<DatabaseId> = Vec::new();
        for entry in &self.entries {
            if !databases.contains(&entry.database) {
                databases.push(entry.database.clone());
            }
        }
        databases
    }

    /// Migrations of one database, in registration order
    pub fn for_database<'a>(&'a self, database: &'a DatabaseId) -> impl Iterator<Item = &'a RegisteredMigration> + 'a {
        self.entries.iter().filter(move |entry| &entry.database == database)
    }
}
