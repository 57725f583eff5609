//! Query Builder ORDER BY operations

use super::builder::QueryBuilder;
use super::types::*;
use crate::model::Model;

impl<M: Model> QueryBuilder<M> {
    /// Add a sort key; earlier keys take precedence
    pub fn sort(mut self, field: &str, direction: OrderDirection) -> Self {
        self.query.sorts.push(Sort {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn sort_desc(self, field: &str) -> Self {
        self.sort(field, OrderDirection::Desc)
    }

    /// Newest first, by the model's created-at field
    pub fn latest(self) -> Self {
        self.sort_desc(M::created_at_field())
    }
}
