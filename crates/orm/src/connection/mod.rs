//! Connection Management
//!
//! A [`Connection`] is one live backend session. Connections are opened by a
//! [`ConnectionFactory`], bounded and reused by a [`ConnectionPool`], and
//! reached through a [`Database`] handle registered under a logical
//! [`DatabaseId`].

pub mod cache;
pub mod database;
pub mod pool;
pub mod statistics;

pub use cache::*;
pub use database::*;
pub use pool::*;
pub use statistics::*;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::backends::{BackendCapabilities, Row, Statement};
use crate::error::{ModelError, OrmResult};
use crate::query::DatabaseQuery;
use crate::schema::Schema;

/// A single backend session.
///
/// Not shared between tasks: whoever holds `&mut` owns the session until it
/// is handed back to the pool.
#[async_trait]
pub trait Connection: Send {
    /// Execute a query, returning every row the backend produced in order.
    ///
    /// Create, Update and Delete return the affected rows.
    async fn execute(&mut self, query: &DatabaseQuery) -> OrmResult<Vec<Row>>;

    /// Execute a query as a stream of rows
    fn stream<'c>(&'c mut self, query: &'c DatabaseQuery) -> BoxStream<'c, OrmResult<Row>> {
        stream::once(self.execute(query))
            .map_ok(|rows| stream::iter(rows.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }

    /// Apply a schema change
    async fn execute_schema(&mut self, schema: &Schema) -> OrmResult<()>;

    fn capabilities(&self) -> BackendCapabilities;

    /// Backend-native form of a query, used for the database log
    fn render(&self, query: &DatabaseQuery) -> OrmResult<Statement> {
        Ok(Statement {
            text: query.to_string(),
            binds: query.bound_values(),
        })
    }

    async fn begin(&mut self) -> OrmResult<()> {
        Err(ModelError::Unsupported("transactions".to_string()))
    }

    async fn commit(&mut self) -> OrmResult<()> {
        Err(ModelError::Unsupported("transactions".to_string()))
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        Err(ModelError::Unsupported("transactions".to_string()))
    }

    /// Shut the session down; the connection must not be used afterwards
    async fn close(&mut self) -> OrmResult<()> {
        Ok(())
    }
}

/// Opens new backend sessions for a pool
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self) -> OrmResult<Box<dyn Connection>>;

    fn capabilities(&self) -> BackendCapabilities;
}
