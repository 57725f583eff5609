//! Query Builder DML operations (create, update, delete)
//!
//! Single-model operations address the row by identifier only; filters on
//! the builder are ignored. Every operation runs, in order: identifier
//! check, observer pre-hook, model `will_*` hook, timestamp stamping,
//! backend call, observer post-hook, model `did_*` hook. The first failure
//! stops the sequence.

use chrono::Utc;

use super::builder::QueryBuilder;
use super::types::*;
use crate::backends::{DatabaseValue, Row};
use crate::error::{ModelError, ModelResult};
use crate::model::Model;

impl<M: Model> QueryBuilder<M> {
    /// Insert `model`; returns it as stored, with the assigned identifier
    pub async fn create(&self, mut model: M) -> ModelResult<M> {
        let observers = self.database.observers().observers_for::<M>();
        observers.trigger_creating(&mut model).await?;
        model.will_create()?;

        if M::uses_timestamps() {
            let now = Utc::now();
            model.set_created_at(now);
            model.set_updated_at(now);
        }

        let mut query = DatabaseQuery::new(M::entity(), QueryAction::Create);
        query.input.push(model.to_fields()?);
        let rows = self.database.run(&query).await?;
        if let Some(row) = rows.first() {
            model = M::from_row(row)?;
        }
        tracing::debug!("Created {} {:?}", M::entity(), model.primary_key());

        observers.trigger_created(&model).await?;
        model.did_create()?;
        Ok(model)
    }

    /// Write every field of `model` to its row
    pub async fn update(&self, mut model: M) -> ModelResult<M> {
        let key = identifier_of(&model)?;
        let observers = self.database.observers().observers_for::<M>();
        observers.trigger_updating(&mut model).await?;
        model.will_update()?;

        if M::uses_timestamps() {
            model.set_updated_at(Utc::now());
        }

        let mut input = model.to_fields()?;
        input.retain(|(field, _)| field != M::primary_key_name());
        let rows = self.write(key, QueryAction::Update, input).await?;
        if let Some(row) = rows.first() {
            model = M::from_row(row)?;
        }

        observers.trigger_updated(&model).await?;
        model.did_update()?;
        Ok(model)
    }

    /// Create when `model` has no identifier yet, update otherwise
    pub async fn save(&self, model: M) -> ModelResult<M> {
        match model.primary_key() {
            Some(_) => self.update(model).await,
            None => self.create(model).await,
        }
    }

    /// Delete `model`; soft-deletable models only get their deleted-at field set
    pub async fn delete(&self, model: M) -> ModelResult<M> {
        self.remove(model, !M::uses_soft_deletes()).await
    }

    /// Physically delete `model`, even when it is soft-deletable
    pub async fn force_delete(&self, model: M) -> ModelResult<M> {
        self.remove(model, true).await
    }

    /// Clear the deleted-at field of a soft-deleted model
    pub async fn restore(&self, mut model: M) -> ModelResult<M> {
        if !M::uses_soft_deletes() {
            return Err(ModelError::Unsupported(format!(
                "restore on '{}', which has no soft deletes",
                M::entity()
            )));
        }
        model.set_deleted_at(None);
        self.clone().with_soft_deleted().update(model).await
    }

    async fn remove(&self, mut model: M, physical: bool) -> ModelResult<M> {
        let key = identifier_of(&model)?;
        let observers = self.database.observers().observers_for::<M>();
        observers.trigger_deleting(&model).await?;
        model.will_delete()?;

        if physical {
            self.write(key, QueryAction::Delete, Vec::new()).await?;
        } else {
            let now = Utc::now();
            model.set_deleted_at(Some(now));
            let input = vec![(M::deleted_at_field().to_string(), Value::from(now))];
            self.write(key, QueryAction::Update, input).await?;
        }
        tracing::debug!("Deleted {} {}", M::entity(), if physical { "row" } else { "softly" });

        observers.trigger_deleted(&model).await?;
        model.did_delete()?;
        Ok(model)
    }

    /// Update or delete the row with identifier `key`; zero matched rows is
    /// `NotFound`
    async fn write(&self, key: DatabaseValue, action: QueryAction, input: InputRow) -> ModelResult<Vec<Row>> {
        let mut query = self.scratch_query(action);
        query.filters.insert(0, Filter::basic(M::primary_key_name(), FilterMethod::EQUAL, key));
        if !input.is_empty() {
            query.input.push(input);
        }

        let rows = self.database.run(&query).await?;
        if rows.is_empty() {
            return Err(ModelError::NotFound(M::entity().to_string()));
        }
        Ok(rows)
    }

    /// The entity's IR with only the soft-delete scope applied
    fn scratch_query(&self, action: QueryAction) -> DatabaseQuery {
        let mut scratch = self.scratch();
        scratch.with_soft_deleted = self.with_soft_deleted;
        scratch.to_query(action)
    }

    /// Update every row the builder's filters match, without model hooks.
    ///
    /// Returns the number of rows changed.
    pub async fn bulk_update(&self, input: InputRow) -> ModelResult<u64> {
        let mut query = self.to_query(QueryAction::Update);
        query.input.push(input);
        let rows = self.database.run(&query).await?;
        Ok(rows.len() as u64)
    }

    /// Delete every row the builder's filters match, without model hooks.
    ///
    /// Soft-deletable rows get their deleted-at field set instead.
    pub async fn bulk_delete(&self) -> ModelResult<u64> {
        if M::uses_soft_deletes() {
            let input = vec![(M::deleted_at_field().to_string(), Value::from(Utc::now()))];
            return self.bulk_update(input).await;
        }
        let rows = self.database.run(&self.to_query(QueryAction::Delete)).await?;
        Ok(rows.len() as u64)
    }
}

fn identifier_of<M: Model>(model: &M) -> ModelResult<DatabaseValue> {
    model
        .primary_key()
        .map(Into::into)
        .ok_or_else(|| ModelError::MissingPrimaryKey {
            entity: M::entity().to_string(),
        })
}
