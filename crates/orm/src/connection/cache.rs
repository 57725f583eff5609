//! Per-unit-of-work connection cache
//!
//! A [`ConnectionCache`] belongs to one task (a request handler, a job). The
//! first query against a database checks a connection out of the pool;
//! later ones reuse it. Everything goes back to the pool when the cache is
//! dropped or [`release_all`](ConnectionCache::release_all) is called.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use super::{Database, DatabaseId, PooledConnection};
use crate::error::ModelResult;

#[derive(Debug, Default)]
pub struct ConnectionCache {
    active: HashMap<DatabaseId, PooledConnection>,
}

impl ConnectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The connection this unit of work holds for `database`, acquiring one
    /// on first use
    pub async fn connection(&mut self, database: &Database) -> ModelResult<&mut PooledConnection> {
        match self.active.entry(database.id().clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let connection = database.pool().request_connection().await?;
                tracing::trace!("Cached connection to '{}'", database.id());
                Ok(entry.insert(connection))
            }
        }
    }

    pub fn holds(&self, id: &DatabaseId) -> bool {
        self.active.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Return every cached connection to its pool
    pub fn release_all(&mut self) -> usize {
        let count = self.active.len();
        self.active.clear();
        if count > 0 {
            tracing::trace!("Released {} cached connections", count);
        }
        count
    }
}
