//! Migration Runner - Executes migrations against the registered databases
//!
//! Each database keeps its own log entity. Migrations run strictly one after
//! another; the first failure stops the run and the log reflects exactly
//! what was applied or reverted before it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use super::definitions::*;
use super::registry::{Migrations, RegisteredMigration};
use crate::backends::{DatabaseValue, Row};
use crate::config::MigrationConfig;
use crate::connection::{Connection, Database, DatabaseId, Databases};
use crate::error::{ModelError, ModelResult};
use crate::query::*;
use crate::schema::SchemaBuilder;

/// Applies and reverts registered migrations in batches
pub struct Migrator {
    databases: Arc<Databases>,
    migrations: Migrations,
    config: MigrationConfig,
}

impl Migrator {
    pub fn new(databases: Arc<Databases>, migrations: Migrations, config: MigrationConfig) -> Self {
        Self {
            databases,
            migrations,
            config,
        }
    }

    pub fn migrations(&self) -> &Migrations {
        &self.migrations
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Ensure the log entity exists on every database with migrations
    pub async fn setup_if_needed(&self) -> ModelResult<()> {
        for id in self.migrations.databases() {
            let database = self.databases.database(&id)?;
            let mut connection = database.pool().request_connection().await?;
            self.setup_log(&database, &mut *connection).await?;
        }
        Ok(())
    }

    /// Apply every unapplied migration, in registration order, as one batch
    /// per database
    pub async fn prepare_batch(&self) -> ModelResult<MigrationRunResult> {
        let start_time = Instant::now();
        let mut result = MigrationRunResult::default();

        for id in self.migrations.databases() {
            let database = self.databases.database(&id)?;
            let mut connection = database.pool().request_connection().await?;
            self.setup_log(&database, &mut *connection).await?;

            let records = self.records(&database, &mut *connection).await?;
            let applied: HashSet<&str> = records.iter().map(|record| record.name.as_str()).collect();
            let batch = records.iter().map(|record| record.batch).max().unwrap_or(0) + 1;

            for entry in self.migrations.for_database(&id) {
                if applied.contains(entry.name()) {
                    result.skipped_count += 1;
                    continue;
                }

                tracing::info!("Applying migration '{}' on '{}' (batch {})", entry.name(), id, batch);
                entry
                    .migration
                    .prepare(&mut *connection)
                    .await
                    .map_err(|e| ModelError::migration(entry.name(), e))?;
                self.insert_record(&database, &mut *connection, entry.name(), batch)
                    .await
                    .map_err(|e| ModelError::migration(entry.name(), e))?;

                result.applied_migrations.push(entry.name().to_string());
                result.batch = result.batch.max(Some(batch));
            }
        }

        result.execution_time_ms = start_time.elapsed().as_millis();
        if result.applied_migrations.is_empty() {
            tracing::info!("Nothing to migrate");
        }
        Ok(result)
    }

    /// Revert the newest batch of every database, in reverse registration
    /// order
    pub async fn revert_last_batch(&self) -> ModelResult<RollbackResult> {
        let start_time = Instant::now();
        let mut result = RollbackResult::default();

        for id in self.migrations.databases().iter().rev() {
            let database = self.databases.database(id)?;
            let mut connection = database.pool().request_connection().await?;
            self.setup_log(&database, &mut *connection).await?;
            result.absorb(self.revert_batch_on(&database, &mut *connection).await?);
        }

        result.execution_time_ms = start_time.elapsed().as_millis();
        Ok(result)
    }

    /// Revert batches until every log is empty
    pub async fn revert_all_batches(&self) -> ModelResult<RollbackResult> {
        let start_time = Instant::now();
        let mut result = RollbackResult::default();

        loop {
            let step = self.revert_last_batch().await?;
            if step.batches.is_empty() {
                break;
            }
            result.absorb(step);
        }

        result.execution_time_ms = start_time.elapsed().as_millis();
        Ok(result)
    }

    /// Applied batch of every registered migration.
    ///
    /// A database whose log does not exist yet reports everything pending;
    /// any other failure reading the log is returned.
    pub async fn status(&self) -> ModelResult<Vec<MigrationState>> {
        let mut states = Vec::with_capacity(self.migrations.len());

        for id in self.migrations.databases() {
            let database = self.databases.database(&id)?;
            let mut connection = database.pool().request_connection().await?;
            let records = match self.records(&database, &mut *connection).await {
                Ok(records) => records,
                Err(ModelError::UnknownEntity(_)) => {
                    tracing::debug!("No migration log on '{}' yet", id);
                    Vec::new()
                }
                Err(err) => return Err(err),
            };

            for entry in self.migrations.for_database(&id) {
                let status = records
                    .iter()
                    .find(|record| record.name == entry.name())
                    .map(|record| MigrationStatus::Applied {
                        applied_at: record.applied_at,
                        batch: record.batch,
                    })
                    .unwrap_or(MigrationStatus::Pending);
                states.push(MigrationState {
                    name: entry.name().to_string(),
                    database: id.clone(),
                    status,
                });
            }
        }
        Ok(states)
    }

    async fn revert_batch_on(&self, database: &Database, connection: &mut dyn Connection) -> ModelResult<RollbackResult> {
        let mut result = RollbackResult::default();
        let records = self.records(database, connection).await?;
        let batch = match records.iter().map(|record| record.batch).max() {
            Some(batch) => batch,
            None => return Ok(result),
        };

        let registered: Vec<&RegisteredMigration> = self.migrations.for_database(database.id()).collect();
        let mut targets = Vec::new();
        for record in records.iter().filter(|record| record.batch == batch) {
            let position = registered
                .iter()
                .position(|entry| entry.name() == record.name)
                .ok_or_else(|| {
                    ModelError::migration(
                        &record.name,
                        ModelError::Configuration(format!(
                            "applied on '{}' but not registered",
                            database.id()
                        )),
                    )
                })?;
            targets.push((position, record));
        }
        targets.sort_by(|a, b| b.0.cmp(&a.0));

        for (position, record) in targets {
            let entry = registered[position];
            tracing::info!("Reverting migration '{}' on '{}' (batch {})", entry.name(), database.id(), batch);
            entry
                .migration
                .revert(connection)
                .await
                .map_err(|e| ModelError::migration(entry.name(), e))?;
            self.delete_record(database, connection, record.id)
                .await
                .map_err(|e| ModelError::migration(entry.name(), e))?;
            result.rolled_back_migrations.push(entry.name().to_string());
        }
        result.batches.push(batch);
        Ok(result)
    }

    /// Create the log entity when a count probe reports it missing
    async fn setup_log(&self, database: &Database, connection: &mut dyn Connection) -> ModelResult<()> {
        let mut probe = DatabaseQuery::new(self.config.table.as_str(), QueryAction::Read);
        probe.aggregate = Some(Aggregate::Count);
        match connection.execute(&probe).await {
            Ok(_) => return Ok(()),
            Err(ModelError::UnknownEntity(_)) => {}
            Err(err) => return Err(err),
        }

        tracing::debug!("Creating migration log '{}' on '{}'", self.config.table, database.id());
        SchemaBuilder::create(&self.config.table)
            .id()
            .string("name", None, true)
            .big_int("batch", true)
            .timestamp("applied_at", true)
            .unique_index(&["name"])
            .run(connection)
            .await
    }

    /// Log records, oldest first
    async fn records(&self, database: &Database, connection: &mut dyn Connection) -> ModelResult<Vec<MigrationRecord>> {
        let mut query = DatabaseQuery::new(self.config.table.as_str(), QueryAction::Read);
        query.sorts.push(Sort {
            field: "id".to_string(),
            direction: OrderDirection::Asc,
        });
        let rows = database.execute(connection, &query).await?;
        rows.iter().map(Row::decode::<MigrationRecord>).collect()
    }

    async fn insert_record(
        &self,
        database: &Database,
        connection: &mut dyn Connection,
        name: &str,
        batch: i64,
    ) -> ModelResult<()> {
        let mut query = DatabaseQuery::new(self.config.table.as_str(), QueryAction::Create);
        query.input.push(vec![
            ("name".to_string(), Value::from(name)),
            ("batch".to_string(), Value::from(batch)),
            ("applied_at".to_string(), Value::from(Utc::now())),
        ]);
        database.execute(connection, &query).await?;
        Ok(())
    }

    async fn delete_record(&self, database: &Database, connection: &mut dyn Connection, id: i64) -> ModelResult<()> {
        let mut query = DatabaseQuery::new(self.config.table.as_str(), QueryAction::Delete);
        query
            .filters
            .push(Filter::basic("id", FilterMethod::EQUAL, DatabaseValue::Int64(id)));
        database.execute(connection, &query).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("databases", &self.databases.ids())
            .field("migrations", &self.migrations)
            .field("config", &self.config)
            .finish()
    }
}

/// Migrator over a single database, for tools that only manage one
pub fn single_database_migrator(database: Database, migrations: Migrations) -> ModelResult<Migrator> {
    let ids: Vec<DatabaseId> = migrations.databases();
    if let Some(other) = ids.iter().find(|id| *id != database.id()) {
        return Err(ModelError::Configuration(format!(
            "Migration registered for '{}' but only '{}' is available",
            other,
            database.id()
        )));
    }
    let databases = Databases::new();
    databases.register(database);
    Ok(Migrator::new(Arc::new(databases), migrations, MigrationConfig::default()))
}
