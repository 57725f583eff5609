//! Query Builder execution for Model types

use futures::TryStreamExt;

use super::builder::QueryBuilder;
use super::types::*;
use crate::error::{ModelError, ModelResult};
use crate::model::Model;

impl<M: Model> QueryBuilder<M> {
    /// Execute the Read and decode every row, in backend order
    pub async fn all(&self) -> ModelResult<Vec<M>> {
        let query = self.to_query(QueryAction::Read);
        let mut connection = self.database.pool().request_connection().await?;
        let rows = self.database.execute(&mut *connection, &query).await?;

        let mut models = rows.iter().map(M::from_row).collect::<ModelResult<Vec<M>>>()?;
        self.load_relations(&mut *connection, &mut models).await?;
        Ok(models)
    }

    /// Execute query and return first model
    pub async fn first(&self) -> ModelResult<Option<M>> {
        let mut models = self.clone().limit(1).all().await?;
        Ok(if models.is_empty() { None } else { Some(models.swap_remove(0)) })
    }

    /// Execute query and return first model or error
    pub async fn first_or_fail(&self) -> ModelResult<M> {
        self.first()
            .await?
            .ok_or_else(|| ModelError::NotFound(M::entity().to_string()))
    }

    /// First model with the given identifier
    pub async fn find(&self, id: M::PrimaryKey) -> ModelResult<Option<M>> {
        self.clone().filter_eq(M::primary_key_name(), id).first().await
    }

    pub async fn find_or_fail(&self, id: M::PrimaryKey) -> ModelResult<M> {
        self.find(id)
            .await?
            .ok_or_else(|| ModelError::NotFound(M::entity().to_string()))
    }

    /// Number of rows the filters match; sorts, projection and paging are ignored
    pub async fn count(&self) -> ModelResult<u64> {
        let mut query = self.to_query(QueryAction::Read);
        query.aggregate = Some(Aggregate::Count);
        query.fields.clear();
        query.sorts.clear();
        query.limit = None;
        query.offset = None;

        let rows = self.database.run(&query).await?;
        let row = rows
            .first()
            .ok_or_else(|| ModelError::Database(format!("count on '{}' returned no rows", M::entity())))?;
        let count: i64 = row.get(AGGREGATE_COLUMN)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Stream the Read and hand decoded models to `callback` in batches of at
    /// most `max`, flushing the last partial batch.
    ///
    /// Arrival order is preserved within and across batches. Eager loads are
    /// not applied to chunks.
    pub async fn chunk<F>(&self, max: usize, mut callback: F) -> ModelResult<()>
    where
        F: FnMut(Vec<M>) -> ModelResult<()>,
    {
        if max == 0 {
            return Err(ModelError::Configuration("chunk size must be at least 1".to_string()));
        }

        let query = self.to_query(QueryAction::Read);
        let mut connection = self.database.pool().request_connection().await?;
        self.database.record(&*connection, &query)?;

        let mut rows = connection.stream(&query);
        let mut batch = Vec::new();
        while let Some(row) = rows.try_next().await? {
            batch.push(M::from_row(&row)?);
            if batch.len() == max {
                callback(std::mem::take(&mut batch))?;
            }
        }
        if !batch.is_empty() {
            callback(batch)?;
        }
        Ok(())
    }
}
