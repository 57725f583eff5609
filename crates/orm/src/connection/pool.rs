//! Connection Pool Management
//!
//! A pool bounds the number of open connections for one logical database.
//! Every handed-out connection holds a semaphore permit, so callers beyond
//! `max_connections` suspend in FIFO order until a connection comes back.
//! New connections are only opened when no idle one is available, which
//! keeps `idle + in_use` at or below `max_connections`.
//!
//! A handed-out connection is a [`PooledConnection`] guard. Dropping the
//! guard, or passing it to [`ConnectionPool::release_connection`], returns
//! the connection; a guard can only be released once.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use super::statistics::PoolStats;
use super::{Connection, ConnectionFactory, DatabaseId};
use crate::backends::BackendCapabilities;
use crate::config::PoolConfig;
use crate::error::{ModelResult, PoolError};

/// Milliseconds in `limit`, saturating at `u64::MAX`
fn whole_millis(limit: Duration) -> u64 {
    u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)
}

/// Bounded, reusable set of connections for one logical database
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    database: DatabaseId,
    factory: Arc<dyn ConnectionFactory>,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState>,
    acquire_count: AtomicU64,
    acquire_errors: AtomicU64,
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<Box<dyn Connection>>,
    in_use: usize,
    closed: bool,
}

impl PoolInner {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn closed_error(&self) -> PoolError {
        PoolError::Closed {
            database: self.database.to_string(),
        }
    }

    fn acquire_failed(&self, err: PoolError) -> PoolError {
        self.acquire_errors.fetch_add(1, Ordering::Relaxed);
        err
    }

    /// Take a connection back from a guard. Runs before the guard's permit is
    /// dropped so a woken waiter finds it idle.
    fn check_in(&self, connection: Box<dyn Connection>) {
        let mut state = self.state();
        state.in_use = state.in_use.saturating_sub(1);
        if state.closed {
            tracing::debug!(
                "Dropping connection returned to closed pool '{}'",
                self.database
            );
        } else {
            state.idle.push_back(connection);
            tracing::trace!(
                "Connection returned to pool '{}' (idle: {}, in use: {})",
                self.database,
                state.idle.len(),
                state.in_use
            );
        }
    }

    /// Drop a connection whose transaction was never finished, freeing its
    /// slot. The rollback is attempted without waiting; a backend that needs
    /// I/O for it ends the transaction when the session closes.
    fn abandon(&self, mut connection: Box<dyn Connection>) {
        {
            let mut state = self.state();
            state.in_use = state.in_use.saturating_sub(1);
        }
        match connection.rollback().now_or_never() {
            Some(Ok(())) => {
                tracing::warn!("Rolled back unfinished transaction on '{}'", self.database)
            }
            Some(Err(err)) => tracing::warn!(
                "Rollback of unfinished transaction on '{}' failed: {}",
                self.database,
                err
            ),
            None => tracing::warn!(
                "Closing connection to '{}' with an unfinished transaction",
                self.database
            ),
        }
        drop(connection);
    }
}

impl ConnectionPool {
    pub fn new(
        database: DatabaseId,
        factory: Arc<dyn ConnectionFactory>,
        config: PoolConfig,
    ) -> ModelResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                database,
                factory,
                permits: Arc::new(Semaphore::new(config.max_connections)),
                config,
                state: Mutex::new(PoolState::default()),
                acquire_count: AtomicU64::new(0),
                acquire_errors: AtomicU64::new(0),
            }),
        })
    }

    pub fn database_id(&self) -> &DatabaseId {
        &self.inner.database
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn capabilities(&self) -> BackendCapabilities {
        self.inner.factory.capabilities()
    }

    /// Acquire a connection, waiting for one to be released if the pool is
    /// at capacity.
    ///
    /// Waiting is cancel-safe: dropping the returned future gives up the
    /// place in the queue without taking a connection.
    pub async fn request_connection(&self) -> ModelResult<PooledConnection> {
        let inner = &self.inner;
        let acquire = inner.permits.clone().acquire_owned();

        let permit = match inner.config.acquire_timeout {
            Some(limit) => match tokio::time::timeout(limit, acquire).await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::warn!(
                        "Timed out after {:?} waiting for a connection to '{}'",
                        limit,
                        inner.database
                    );
                    return Err(inner
                        .acquire_failed(PoolError::Timeout {
                            database: inner.database.to_string(),
                            timeout_ms: whole_millis(limit),
                        })
                        .into());
                }
            },
            None => acquire.await,
        }
        .map_err(|_| inner.acquire_failed(inner.closed_error()))?;

        self.check_out(permit).await
    }

    /// Acquire a connection without waiting for a release.
    ///
    /// Fails with [`PoolError::Exhausted`] when every connection is in use.
    pub async fn try_request_connection(&self) -> ModelResult<PooledConnection> {
        let inner = &self.inner;
        let permit = inner.permits.clone().try_acquire_owned().map_err(|err| match err {
            TryAcquireError::NoPermits => {
                tracing::debug!("Pool '{}' exhausted", inner.database);
                inner.acquire_failed(PoolError::Exhausted {
                    database: inner.database.to_string(),
                    max_connections: inner.config.max_connections,
                })
            }
            TryAcquireError::Closed => inner.acquire_failed(inner.closed_error()),
        })?;

        self.check_out(permit).await
    }

    async fn check_out(&self, permit: OwnedSemaphorePermit) -> ModelResult<PooledConnection> {
        let inner = &self.inner;

        let idle = {
            let mut state = inner.state();
            if state.closed {
                return Err(inner.acquire_failed(inner.closed_error()).into());
            }
            let connection = state.idle.pop_front();
            if connection.is_some() {
                state.in_use += 1;
            }
            connection
        };

        let connection = match idle {
            Some(connection) => connection,
            None => match inner.factory.connect().await {
                Ok(connection) => {
                    let mut state = inner.state();
                    state.in_use += 1;
                    tracing::debug!(
                        "Opened connection to '{}' (open: {}/{})",
                        inner.database,
                        state.idle.len() + state.in_use,
                        inner.config.max_connections
                    );
                    connection
                }
                Err(err) => {
                    inner.acquire_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::error!("Failed to open connection to '{}': {}", inner.database, err);
                    return Err(err);
                }
            },
        };

        inner.acquire_count.fetch_add(1, Ordering::Relaxed);
        Ok(PooledConnection {
            connection: Some(connection),
            pool: Arc::clone(inner),
            in_transaction: false,
            _permit: permit,
        })
    }

    /// Return a connection to the pool it was taken from.
    ///
    /// A guard from a different pool is rejected with
    /// [`PoolError::ForeignConnection`]; it still goes back to its own pool
    /// when dropped.
    pub fn release_connection(&self, connection: PooledConnection) -> Result<(), PoolError> {
        if !Arc::ptr_eq(&self.inner, &connection.pool) {
            tracing::error!(
                "Connection from pool '{}' released to pool '{}'",
                connection.pool.database,
                self.inner.database
            );
            return Err(PoolError::ForeignConnection {
                database: self.inner.database.to_string(),
            });
        }
        drop(connection);
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state();
        PoolStats {
            total: state.idle.len() + state.in_use,
            idle: state.idle.len(),
            in_use: state.in_use,
            max_connections: self.inner.config.max_connections,
            acquire_count: self.inner.acquire_count.load(Ordering::Relaxed),
            acquire_errors: self.inner.acquire_errors.load(Ordering::Relaxed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state().closed
    }

    /// Close idle connections and refuse further requests.
    ///
    /// Waiting callers fail with [`PoolError::Closed`]; connections still in
    /// use are dropped when their guards are.
    pub async fn close(&self) {
        let idle: Vec<Box<dyn Connection>> = {
            let mut state = self.inner.state();
            state.closed = true;
            state.idle.drain(..).collect()
        };
        self.inner.permits.close();

        let count = idle.len();
        for mut connection in idle {
            if let Err(err) = connection.close().await {
                tracing::warn!("Error closing connection to '{}': {}", self.inner.database, err);
            }
        }
        tracing::info!("Closed pool '{}' ({} idle connections)", self.inner.database, count);
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("database", &self.inner.database)
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A connection checked out of a [`ConnectionPool`].
///
/// Dereferences to the connection. Dropping it returns the connection,
/// unless a transaction opened through it is still unfinished: then the
/// connection is discarded and its slot freed.
pub struct PooledConnection {
    connection: Option<Box<dyn Connection>>,
    pool: Arc<PoolInner>,
    in_transaction: bool,
    // Dropped after `Drop::drop` has returned the connection
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub fn database_id(&self) -> &DatabaseId {
        &self.pool.database
    }

    pub(crate) fn set_in_transaction(&mut self, open: bool) {
        self.in_transaction = open;
    }

    /// Close the connection instead of returning it, freeing its slot
    pub async fn discard(mut self) {
        if let Some(mut connection) = self.connection.take() {
            {
                let mut state = self.pool.state();
                state.in_use = state.in_use.saturating_sub(1);
            }
            if let Err(err) = connection.close().await {
                tracing::warn!("Error closing discarded connection: {}", err);
            }
            tracing::debug!("Discarded connection to '{}'", self.pool.database);
        }
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        match self.connection.as_deref() {
            Some(connection) => connection,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.connection.as_deref_mut() {
            Some(connection) => connection,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            if self.in_transaction {
                self.pool.abandon(connection);
            } else {
                self.pool.check_in(connection);
            }
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("database", &self.pool.database)
            .finish()
    }
}
