//! Logical databases and their registry
//!
//! Every query-building entry point takes a [`Database`] handle explicitly;
//! there is no process-wide "current database".

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;

use super::{Connection, ConnectionFactory, ConnectionPool, PooledConnection};
use crate::backends::{BackendCapabilities, Row};
use crate::config::PoolConfig;
use crate::error::{ModelError, ModelResult};
use crate::events::ModelObserver;
use crate::logging::{DatabaseLog, QueryLogger};
use crate::model::Model;
use crate::observers::ObserverRegistry;
use crate::query::{DatabaseQuery, QueryBuilder};

/// Logical database identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatabaseId(String);

impl DatabaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DatabaseId {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DatabaseId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DatabaseId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Handle to one logical database: its pool, observers and query log
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    pool: ConnectionPool,
    observers: ObserverRegistry,
    logger: Option<Arc<dyn QueryLogger>>,
}

impl Database {
    pub fn new(pool: ConnectionPool) -> Self {
        Self::build(pool, None)
    }

    pub fn with_logger(pool: ConnectionPool, logger: Arc<dyn QueryLogger>) -> Self {
        Self::build(pool, Some(logger))
    }

    /// Create a pool over `factory` and wrap it
    pub fn connect(
        id: impl Into<DatabaseId>,
        factory: Arc<dyn ConnectionFactory>,
        config: PoolConfig,
    ) -> ModelResult<Self> {
        Ok(Self::new(ConnectionPool::new(id.into(), factory, config)?))
    }

    fn build(pool: ConnectionPool, logger: Option<Arc<dyn QueryLogger>>) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                pool,
                observers: ObserverRegistry::new(),
                logger,
            }),
        }
    }

    pub fn id(&self) -> &DatabaseId {
        self.inner.pool.database_id()
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    pub fn capabilities(&self) -> BackendCapabilities {
        self.inner.pool.capabilities()
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.inner.observers
    }

    /// Register a lifecycle observer for model `M`
    pub fn observe<M: Model>(&self, observer: impl ModelObserver<M> + 'static) {
        self.inner.observers.register::<M>(Arc::new(observer));
    }

    /// Start a query for model `M`
    pub fn query<M: Model>(&self) -> QueryBuilder<M> {
        QueryBuilder::new(self.clone())
    }

    /// Run `body` with a connection from the pool.
    ///
    /// The connection goes back to the pool on every exit path, including
    /// errors, panics and cancellation of the returned future.
    pub async fn with_connection<T, F>(&self, body: F) -> ModelResult<T>
    where
        F: for<'c> FnOnce(&'c mut PooledConnection) -> BoxFuture<'c, ModelResult<T>>,
    {
        let mut connection = self.inner.pool.request_connection().await?;
        let result = body(&mut connection).await;
        drop(connection);
        result
    }

    /// Run `body` inside a transaction, committing on `Ok` and rolling back
    /// on `Err`
    pub async fn transaction<T, F>(&self, body: F) -> ModelResult<T>
    where
        F: for<'c> FnOnce(&'c mut PooledConnection) -> BoxFuture<'c, ModelResult<T>>,
    {
        if !self.capabilities().transactions {
            return Err(ModelError::Unsupported(format!(
                "transactions on '{}'",
                self.id()
            )));
        }

        let mut connection = self.inner.pool.request_connection().await?;
        // Until cleared, dropping the guard discards the connection
        connection.set_in_transaction(true);
        connection.begin().await?;
        tracing::debug!("Transaction started on '{}'", self.id());

        let outcome = body(&mut connection).await;
        match outcome {
            Ok(value) => {
                if let Err(err) = connection.commit().await {
                    tracing::error!("Commit on '{}' failed, discarding connection: {}", self.id(), err);
                    return Err(err);
                }
                connection.set_in_transaction(false);
                tracing::debug!("Transaction committed on '{}'", self.id());
                Ok(value)
            }
            Err(err) => {
                match connection.rollback().await {
                    Ok(()) => {
                        connection.set_in_transaction(false);
                        tracing::debug!("Transaction rolled back on '{}'", self.id());
                    }
                    Err(rollback_err) => tracing::error!(
                        "Rollback on '{}' failed, discarding connection: {}",
                        self.id(),
                        rollback_err
                    ),
                }
                Err(err)
            }
        }
    }

    /// Record a query in the database log, if one is configured
    pub(crate) fn record(&self, connection: &dyn Connection, query: &DatabaseQuery) -> ModelResult<()> {
        if let Some(logger) = &self.inner.logger {
            let statement = connection.render(query)?;
            logger.record(DatabaseLog::new(self.id().clone(), statement.text, statement.binds));
        }
        Ok(())
    }

    /// Log and execute a query on a connection taken from this database
    pub async fn execute(&self, connection: &mut dyn Connection, query: &DatabaseQuery) -> ModelResult<Vec<Row>> {
        self.record(connection, query)?;
        tracing::trace!("Executing {} on '{}'", query, self.id());
        connection.execute(query).await
    }

    /// Acquire a connection, execute one query and release it
    pub async fn run(&self, query: &DatabaseQuery) -> ModelResult<Vec<Row>> {
        let mut connection = self.inner.pool.request_connection().await?;
        self.execute(&mut *connection, query).await
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("id", self.id())
            .field("pool", &self.inner.pool)
            .field("logger", &self.inner.logger.is_some())
            .finish()
    }
}

/// Registry of logical databases
#[derive(Default)]
pub struct Databases {
    databases: DashMap<DatabaseId, Database>,
}

impl Databases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a database under its own identifier, replacing any previous one
    pub fn register(&self, database: Database) -> Option<Database> {
        tracing::debug!("Registering database '{}'", database.id());
        self.databases.insert(database.id().clone(), database)
    }

    /// Look up a database; an unknown identifier is a configuration error
    pub fn database(&self, id: &DatabaseId) -> ModelResult<Database> {
        self.databases
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ModelError::Configuration(format!("No database registered for '{}'", id)))
    }

    pub fn contains(&self, id: &DatabaseId) -> bool {
        self.databases.contains_key(id)
    }

    pub fn ids(&self) -> Vec<DatabaseId> {
        let mut ids: Vec<DatabaseId> = self.databases.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn remove(&self, id: &DatabaseId) -> Option<Database> {
        self.databases.remove(id).map(|(_, database)| database)
    }

    /// Close every registered pool
    pub async fn close_all(&self) {
        let databases: Vec<Database> = self.databases.iter().map(|entry| entry.value().clone()).collect();
        for database in databases {
            database.pool().close().await;
        }
    }
}
