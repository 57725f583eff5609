//! Query Builder pagination operations

use super::builder::QueryBuilder;
use crate::model::Model;

impl<M: Model> QueryBuilder<M> {
    /// Add LIMIT clause
    pub fn limit(mut self, count: u64) -> Self {
        self.query.limit = Some(count);
        self
    }

    /// Add OFFSET clause
    pub fn offset(mut self, count: u64) -> Self {
        self.query.offset = Some(count);
        self
    }

    /// Select one page; pages start at 1 and page 0 is treated as page 1
    pub fn paginate(self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        self.limit(per_page).offset((page - 1).saturating_mul(per_page))
    }
}
