//! Query Builder - Core builder implementation

use std::fmt;
use std::sync::Arc;

use chrono::Utc;

use super::types::*;
use super::with::EagerLoad;
use crate::connection::Database;
use crate::model::Model;

/// Fluent builder for queries against model `M`'s entity.
///
/// The builder only accumulates IR; nothing runs until one of the executing
/// methods (`all`, `first`, `count`, `create`, ...) is awaited.
pub struct QueryBuilder<M: Model> {
    pub(crate) database: Database,
    pub(crate) query: DatabaseQuery,
    pub(crate) with_soft_deleted: bool,
    pub(crate) eager: Vec<Arc<dyn EagerLoad<M>>>,
}

impl<M: Model> Clone for QueryBuilder<M> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            query: self.query.clone(),
            with_soft_deleted: self.with_soft_deleted,
            eager: self.eager.clone(),
        }
    }
}

impl<M: Model> fmt::Debug for QueryBuilder<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let relations: Vec<&str> = self.eager.iter().map(|relation| relation.name()).collect();
        f.debug_struct("QueryBuilder")
            .field("database", self.database.id())
            .field("query", &self.query)
            .field("with_soft_deleted", &self.with_soft_deleted)
            .field("eager", &relations)
            .finish()
    }
}

impl<M: Model> QueryBuilder<M> {
    /// Create a new query builder
    pub fn new(database: Database) -> Self {
        Self {
            database,
            query: DatabaseQuery::new(M::entity(), QueryAction::Read),
            with_soft_deleted: false,
            eager: Vec::new(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// The IR accumulated so far, without the soft-delete scope
    pub fn query(&self) -> &DatabaseQuery {
        &self.query
    }

    /// Restrict a Read to the given fields
    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.query.fields = fields.iter().map(|field| field.to_string()).collect();
        self
    }

    /// Include soft-deleted rows
    pub fn with_soft_deleted(mut self) -> Self {
        self.with_soft_deleted = true;
        self
    }

    /// Builder sharing this one's database but with no filters, used for
    /// nested groups
    pub(crate) fn scratch(&self) -> Self {
        Self {
            database: self.database.clone(),
            query: DatabaseQuery::new(M::entity(), QueryAction::Read),
            with_soft_deleted: true,
            eager: Vec::new(),
        }
    }

    /// The IR that will actually be executed for `action`.
    ///
    /// The soft-delete scope is added to this copy only, so it appears once
    /// however many times the builder was chained or executed.
    pub fn to_query(&self, action: QueryAction) -> DatabaseQuery {
        let mut query = self.query.clone();
        query.action = action;
        if action != QueryAction::Create && !self.with_soft_deleted {
            if let Some(scope) = soft_delete_scope::<M>() {
                query.filters.push(scope);
            }
        }
        query
    }
}

/// `(deleted_at == null) OR (deleted_at > now)` for soft-deletable models
pub(crate) fn soft_delete_scope<M: Model>() -> Option<Filter> {
    if !M::uses_soft_deletes() {
        return None;
    }
    let field = M::deleted_at_field();
    Some(Filter::group(
        vec![
            Filter::basic(field, FilterMethod::EQUAL, Value::Null),
            Filter::basic(field, FilterMethod::GREATER_THAN, Utc::now()),
        ],
        Relation::Or,
    ))
}
