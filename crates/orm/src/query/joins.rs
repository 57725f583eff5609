//! Query Builder JOIN operations

use super::builder::QueryBuilder;
use super::types::*;
use crate::error::{ModelError, ModelResult};
use crate::model::Model;

impl<M: Model> QueryBuilder<M> {
    /// Add an INNER JOIN of `joined` on `base`
    pub fn join(self, joined: FieldRef, base: FieldRef) -> ModelResult<Self> {
        self.join_with(joined, base, JoinMethod::default())
    }

    /// Add a join of the given kind; fails when the database's backend has
    /// no join support
    pub fn join_with(mut self, joined: FieldRef, base: FieldRef, method: JoinMethod) -> ModelResult<Self> {
        if !self.database.capabilities().joins {
            return Err(ModelError::Unsupported(format!(
                "joins on database '{}'",
                self.database.id()
            )));
        }
        self.query.joins.push(Join {
            method,
            base_field: base,
            joined_field: joined,
        });
        Ok(self)
    }
}
