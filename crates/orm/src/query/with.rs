//! Eager loading
//!
//! A relation registered with [`QueryBuilder::with`] runs one extra Read
//! after the primary rows are decoded: a subset filter over every key the
//! primary models carry. Results are matched back by key and handed to the
//! relation's attach closure.

use std::sync::Arc;

use async_trait::async_trait;

use super::builder::{soft_delete_scope, QueryBuilder};
use super::types::*;
use crate::backends::{DatabaseValue, Row};
use crate::connection::{Connection, Database};
use crate::error::ModelResult;
use crate::model::Model;

/// A relation loaded alongside the primary query
#[async_trait]
pub trait EagerLoad<M: Model>: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the related rows for `models` and attach them
    async fn load(&self, database: &Database, connection: &mut dyn Connection, models: &mut [M]) -> ModelResult<()>;
}

type AttachChildren<P, C> = dyn Fn(&mut P, Vec<C>) + Send + Sync;
type AttachParent<C, P> = dyn Fn(&mut C, Option<P>) + Send + Sync;

/// One-to-many: `C` rows whose `foreign_key` holds the parent's identifier
pub struct Children<P, C> {
    foreign_key: String,
    attach: Arc<AttachChildren<P, C>>,
}

impl<P: Model, C: Model> Children<P, C> {
    pub fn new(foreign_key: &str, attach: impl Fn(&mut P, Vec<C>) + Send + Sync + 'static) -> Self {
        Self {
            foreign_key: foreign_key.to_string(),
            attach: Arc::new(attach),
        }
    }
}

/// Many-to-one: the `P` row whose identifier the model's `foreign_key` holds
pub struct Parent<C, P> {
    foreign_key: String,
    attach: Arc<AttachParent<C, P>>,
}

impl<C: Model, P: Model> Parent<C, P> {
    pub fn new(foreign_key: &str, attach: impl Fn(&mut C, Option<P>) + Send + Sync + 'static) -> Self {
        Self {
            foreign_key: foreign_key.to_string(),
            attach: Arc::new(attach),
        }
    }
}

/// Read `R` rows where `field` is one of `keys`, honouring `R`'s soft deletes
async fn fetch_related<R: Model>(
    database: &Database,
    connection: &mut dyn Connection,
    field: &str,
    keys: Vec<DatabaseValue>,
) -> ModelResult<Vec<Row>> {
    let mut query = DatabaseQuery::new(R::entity(), QueryAction::Read);
    let keys = Value::Group(keys.into_iter().map(Value::Bind).collect());
    query.filters.push(Filter::basic(field, FilterMethod::IN, keys));
    query.filters.extend(soft_delete_scope::<R>());
    database.execute(connection, &query).await
}

fn key_matches(row: &Row, field: &str, key: &DatabaseValue) -> bool {
    row.get_by_name(field)
        .map_or(false, |value| value.loosely_equals(key))
}

/// Distinct non-null keys, in first-seen order
fn distinct(keys: impl IntoIterator<Item = DatabaseValue>) -> Vec<DatabaseValue> {
    let mut distinct: Vec<DatabaseValue> = Vec::new();
    for key in keys {
        if !key.is_null() && !distinct.iter().any(|seen| seen.loosely_equals(&key)) {
            distinct.push(key);
        }
    }
    distinct
}

#[async_trait]
impl<P: Model, C: Model> EagerLoad<P> for Children<P, C> {
    fn name(&self) -> &str {
        C::entity()
    }

    async fn load(&self, database: &Database, connection: &mut dyn Connection, models: &mut [P]) -> ModelResult<()> {
        let keys = distinct(models.iter().filter_map(|model| model.primary_key().map(Into::into)));
        let rows = if keys.is_empty() {
            Vec::new()
        } else {
            fetch_related::<C>(database, connection, &self.foreign_key, keys).await?
        };

        for model in models.iter_mut() {
            let children = match model.primary_key() {
                Some(key) => {
                    let key: DatabaseValue = key.into();
                    rows.iter()
                        .filter(|row| key_matches(row, &self.foreign_key, &key))
                        .map(C::from_row)
                        .collect::<ModelResult<Vec<C>>>()?
                }
                None => Vec::new(),
            };
            (self.attach)(model, children);
        }
        Ok(())
    }
}

#[async_trait]
impl<C: Model, P: Model> EagerLoad<C> for Parent<C, P> {
    fn name(&self) -> &str {
        P::entity()
    }

    async fn load(&self, database: &Database, connection: &mut dyn Connection, models: &mut [C]) -> ModelResult<()> {
        let mut model_keys = Vec::with_capacity(models.len());
        for model in models.iter() {
            model_keys.push(foreign_key_of(model, &self.foreign_key)?);
        }

        let keys = distinct(model_keys.iter().cloned());
        let rows = if keys.is_empty() {
            Vec::new()
        } else {
            fetch_related::<P>(database, connection, P::primary_key_name(), keys).await?
        };

        for (model, key) in models.iter_mut().zip(model_keys) {
            let parent = rows
                .iter()
                .find(|row| !key.is_null() && key_matches(row, P::primary_key_name(), &key))
                .map(P::from_row)
                .transpose()?;
            (self.attach)(model, parent);
        }
        Ok(())
    }
}

fn foreign_key_of<M: Model>(model: &M, field: &str) -> ModelResult<DatabaseValue> {
    Ok(model
        .to_fields()?
        .into_iter()
        .find(|(name, _)| name == field)
        .map(|(_, value)| match value {
            Value::Bind(value) => value,
            _ => DatabaseValue::Null,
        })
        .unwrap_or(DatabaseValue::Null))
}

impl<M: Model> QueryBuilder<M> {
    /// Eager-load a relation with the primary rows
    pub fn with(mut self, relation: impl EagerLoad<M> + 'static) -> Self {
        self.eager.push(Arc::new(relation));
        self
    }

    pub(crate) async fn load_relations(&self, connection: &mut dyn Connection, models: &mut [M]) -> ModelResult<()> {
        if models.is_empty() {
            return Ok(());
        }
        for relation in &self.eager {
            tracing::trace!("Eager loading '{}' for {} {}", relation.name(), models.len(), M::entity());
            relation.load(&self.database, connection, models).await?;
        }
        Ok(())
    }
}
