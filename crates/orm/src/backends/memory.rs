//! In-memory backend
//!
//! Each entity is an ordered list of rows plus an auto-increment counter.
//! Rows are kept in insertion order; Read applies the top-level filters
//! (combined with AND), then any sorts, then offset and limit.
//!
//! Entities must be created through a schema first. Unique fields and
//! unique indexes are enforced, joins and foreign keys are not supported.
//! Transactions snapshot the whole store on `begin` and restore it on
//! `rollback`; they are not isolated from other connections.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::core::{BackendCapabilities, DatabaseValue, Row};
use crate::connection::{Connection, ConnectionFactory};
use crate::error::{ModelError, ModelResult, OrmResult};
use crate::query::types::*;
use crate::schema::{FieldDefinition, Index, Schema, SchemaAction};

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    fields: Vec<FieldDefinition>,
    indexes: Vec<(String, Index)>,
    rows: Vec<Row>,
    counter: i64,
}

type MemoryStore = HashMap<String, MemoryTable>;

/// Factory and shared store for in-memory connections.
///
/// Clones share the same store, so every connection opened from any clone
/// sees the same data.
#[derive(Clone)]
pub struct MemoryDatabase {
    store: Arc<Mutex<MemoryStore>>,
    opened: Arc<AtomicUsize>,
    capabilities: BackendCapabilities,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::with_capabilities(BackendCapabilities {
            joins: false,
            indexes: true,
            references: false,
            transactions: true,
            structured_values: true,
        })
    }

    /// Restrict the engine, e.g. to flat rows with `structured_values: false`.
    /// Capabilities the engine does not implement stay disabled.
    pub fn with_capabilities(capabilities: BackendCapabilities) -> Self {
        Self {
            store: Arc::new(Mutex::new(MemoryStore::new())),
            opened: Arc::new(AtomicUsize::new(0)),
            capabilities: BackendCapabilities {
                joins: false,
                references: false,
                ..capabilities
            },
        }
    }

    /// Number of connections opened so far
    pub fn connections_opened(&self) -> usize {
        self.opened.load(AtomicOrdering::SeqCst)
    }

    pub fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.store).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_entity(&self, entity: &str) -> bool {
        lock(&self.store).contains_key(entity)
    }

    /// Stored rows of an entity, in insertion order
    pub fn rows(&self, entity: &str) -> Option<Vec<Row>> {
        lock(&self.store).get(entity).map(|table| table.rows.clone())
    }

    /// Open a connection without going through a pool
    pub fn connection(&self) -> MemoryConnection {
        self.opened.fetch_add(1, AtomicOrdering::SeqCst);
        MemoryConnection {
            store: self.store.clone(),
            capabilities: self.capabilities,
            snapshot: None,
            closed: false,
        }
    }
}

#[async_trait]
impl ConnectionFactory for MemoryDatabase {
    async fn connect(&self) -> OrmResult<Box<dyn Connection>> {
        Ok(Box::new(self.connection()))
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }
}

fn lock(store: &Mutex<MemoryStore>) -> MutexGuard<'_, MemoryStore> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A session on a [`MemoryDatabase`]
pub struct MemoryConnection {
    store: Arc<Mutex<MemoryStore>>,
    capabilities: BackendCapabilities,
    snapshot: Option<MemoryStore>,
    closed: bool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> ModelResult<()> {
        if self.closed {
            return Err(ModelError::Database("connection is closed".to_string()));
        }
        Ok(())
    }

    fn execute_query(&self, query: &DatabaseQuery) -> ModelResult<Vec<Row>> {
        if !query.joins.is_empty() {
            return Err(ModelError::Unsupported(
                "joins: memory backend has no join support".to_string(),
            ));
        }

        let mut store = lock(&self.store);
        let table = store
            .get_mut(&query.entity)
            .ok_or_else(|| ModelError::UnknownEntity(query.entity.clone()))?;

        match query.action {
            QueryAction::Read => read(table, query),
            QueryAction::Create => create(table, query, &self.capabilities),
            QueryAction::Update => update(table, query, &self.capabilities),
            QueryAction::Delete => delete(table, query),
        }
    }

    fn apply_schema(&self, schema: &Schema) -> ModelResult<()> {
        let mut store = lock(&self.store);

        match schema.action {
            SchemaAction::Create => {
                if store.contains_key(&schema.entity) {
                    return Err(ModelError::Database(format!(
                        "entity '{}' already exists",
                        schema.entity
                    )));
                }
                let mut table = MemoryTable::default();
                add_fields(&mut table, schema)?;
                add_indexes(&mut table, schema);
                store.insert(schema.entity.clone(), table);
            }
            SchemaAction::Update => {
                let table = store
                    .get_mut(&schema.entity)
                    .ok_or_else(|| ModelError::UnknownEntity(schema.entity.clone()))?;
                let mut updated = table.clone();
                add_fields(&mut updated, schema)?;
                for name in &schema.remove_fields {
                    let position = updated
                        .fields
                        .iter()
                        .position(|field| &field.name == name)
                        .ok_or_else(|| {
                            ModelError::Database(format!(
                                "entity '{}' has no field '{}'",
                                schema.entity, name
                            ))
                        })?;
                    updated.fields.remove(position);
                    for row in &mut updated.rows {
                        row.remove(name);
                    }
                }
                for index in &schema.remove_indexes {
                    let name = index.name(&schema.entity);
                    updated.indexes.retain(|(existing, _)| *existing != name);
                }
                add_indexes(&mut updated, schema);
                *table = updated;
            }
            SchemaAction::Delete => {
                if store.remove(&schema.entity).is_none() {
                    return Err(ModelError::UnknownEntity(schema.entity.clone()));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn execute(&mut self, query: &DatabaseQuery) -> OrmResult<Vec<Row>> {
        self.ensure_open()?;
        self.execute_query(query)
    }

    async fn execute_schema(&mut self, schema: &Schema) -> OrmResult<()> {
        self.ensure_open()?;
        schema.check_capabilities(&self.capabilities)?;
        self.apply_schema(schema)
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    async fn begin(&mut self) -> OrmResult<()> {
        self.ensure_open()?;
        if self.snapshot.is_some() {
            return Err(ModelError::Database("transaction already in progress".to_string()));
        }
        self.snapshot = Some(lock(&self.store).clone());
        Ok(())
    }

    async fn commit(&mut self) -> OrmResult<()> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| ModelError::Database("no transaction in progress".to_string()))
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| ModelError::Database("no transaction in progress".to_string()))?;
        *lock(&self.store) = snapshot;
        Ok(())
    }

    async fn close(&mut self) -> OrmResult<()> {
        self.closed = true;
        self.snapshot = None;
        Ok(())
    }
}

fn add_fields(table: &mut MemoryTable, schema: &Schema) -> ModelResult<()> {
    for field in &schema.add_fields {
        if table.fields.iter().any(|existing| existing.name == field.name) {
            return Err(ModelError::Database(format!(
                "entity '{}' already has field '{}'",
                schema.entity, field.name
            )));
        }
        let initial = field.default().cloned().unwrap_or(DatabaseValue::Null);
        for row in &mut table.rows {
            row.set(field.name.clone(), initial.clone());
        }
        table.fields.push(field.clone());
    }
    Ok(())
}

fn add_indexes(table: &mut MemoryTable, schema: &Schema) {
    for index in &schema.add_indexes {
        table.indexes.push((index.name(&schema.entity), index.clone()));
    }
}

fn read(table: &MemoryTable, query: &DatabaseQuery) -> ModelResult<Vec<Row>> {
    let mut rows = Vec::new();
    for row in &table.rows {
        if matches_all(row, &query.filters)? {
            rows.push(row.clone());
        }
    }

    if let Some(Aggregate::Count) = query.aggregate {
        let mut count = Row::new();
        count.set(AGGREGATE_COLUMN, DatabaseValue::Int64(rows.len() as i64));
        return Ok(vec![count]);
    }

    if !query.sorts.is_empty() {
        rows.sort_by(|a, b| {
            for sort in &query.sorts {
                let ordering = compare_nullable(a.get_by_name(&sort.field), b.get_by_name(&sort.field));
                let ordering = match sort.direction {
                    OrderDirection::Asc => ordering,
                    OrderDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    let offset = query.offset.unwrap_or(0) as usize;
    let limit = query.limit.map(|limit| limit as usize).unwrap_or(usize::MAX);
    let rows = rows.into_iter().skip(offset).take(limit);

    if query.fields.is_empty() {
        return Ok(rows.collect());
    }
    Ok(rows
        .map(|row| {
            query
                .fields
                .iter()
                .map(|field| {
                    let value = row.get_by_name(field).cloned().unwrap_or(DatabaseValue::Null);
                    (field.clone(), value)
                })
                .collect()
        })
        .collect())
}

fn create(
    table: &mut MemoryTable,
    query: &DatabaseQuery,
    capabilities: &BackendCapabilities,
) -> ModelResult<Vec<Row>> {
    if query.input.is_empty() {
        return Err(ModelError::Database(format!(
            "create on '{}' without input",
            query.entity
        )));
    }

    let mut staged = table.clone();
    let mut created = Vec::with_capacity(query.input.len());

    for input in &query.input {
        let values = input_values(&query.entity, input, &staged.fields, capabilities)?;
        let mut row = Row::new();

        for field in &staged.fields {
            let value = match values.iter().find(|(name, _)| *name == field.name) {
                Some((_, value)) => value.clone(),
                None => field.default().cloned().unwrap_or(DatabaseValue::Null),
            };

            let value = match (field.identifier(), value) {
                (Some(true), DatabaseValue::Null) => {
                    staged.counter += 1;
                    DatabaseValue::Int64(staged.counter)
                }
                (Some(true), value) => {
                    if let DatabaseValue::Int64(id) = value {
                        staged.counter = staged.counter.max(id);
                    } else if let DatabaseValue::Int32(id) = value {
                        staged.counter = staged.counter.max(i64::from(id));
                    }
                    value
                }
                (_, value) => value,
            };
            row.set(field.name.clone(), value);
        }

        check_constraints(&query.entity, &staged, &row, None)?;
        staged.rows.push(row.clone());
        created.push(row);
    }

    *table = staged;
    Ok(created)
}

fn update(
    table: &mut MemoryTable,
    query: &DatabaseQuery,
    capabilities: &BackendCapabilities,
) -> ModelResult<Vec<Row>> {
    let input = query.input.first().ok_or_else(|| {
        ModelError::Database(format!("update on '{}' without input", query.entity))
    })?;

    let mut staged = table.clone();
    let values = input_values(&query.entity, input, &staged.fields, capabilities)?;
    let mut targets = Vec::new();
    for (position, row) in staged.rows.iter().enumerate() {
        if matches_all(row, &query.filters)? {
            targets.push(position);
        }
    }

    for &position in &targets {
        for (field, value) in &values {
            staged.rows[position].set(field.clone(), value.clone());
        }
    }
    for &position in &targets {
        let row = staged.rows[position].clone();
        check_constraints(&query.entity, &staged, &row, Some(position))?;
    }

    let updated = targets.iter().map(|&position| staged.rows[position].clone()).collect();
    *table = staged;
    Ok(updated)
}

fn delete(table: &mut MemoryTable, query: &DatabaseQuery) -> ModelResult<Vec<Row>> {
    // Evaluated on every row before anything is dropped
    let mut selected = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        selected.push(matches_all(row, &query.filters)?);
    }

    let mut selected = selected.into_iter();
    let (removed, kept): (Vec<Row>, Vec<Row>) = table
        .rows
        .drain(..)
        .partition(|_| selected.next().unwrap_or(false));
    table.rows = kept;
    Ok(removed)
}

/// Resolve input values against the entity's fields
fn input_values(
    entity: &str,
    input: &InputRow,
    fields: &[FieldDefinition],
    capabilities: &BackendCapabilities,
) -> ModelResult<Vec<(String, DatabaseValue)>> {
    input
        .iter()
        .map(|(name, value)| {
            if !fields.iter().any(|field| &field.name == name) {
                return Err(ModelError::Database(format!(
                    "entity '{}' has no field '{}'",
                    entity, name
                )));
            }
            let value = match value {
                Value::Null => DatabaseValue::Null,
                Value::Bind(value) => value.clone(),
                Value::Group(_) => {
                    return Err(ModelError::Serialization(format!(
                        "field '{}' of '{}' holds a nested group; memory rows are flat",
                        name, entity
                    )))
                }
            };
            if value.is_structured() && !capabilities.structured_values {
                return Err(ModelError::Serialization(format!(
                    "field '{}' of '{}' holds structured value {}; backend stores flat rows only",
                    name, entity, value
                )));
            }
            Ok((name.clone(), value))
        })
        .collect()
}

/// Not-null, unique field and unique index checks for `row`, ignoring the
/// row at `own_position`
fn check_constraints(
    entity: &str,
    table: &MemoryTable,
    row: &Row,
    own_position: Option<usize>,
) -> ModelResult<()> {
    let others = || {
        table
            .rows
            .iter()
            .enumerate()
            .filter(move |(position, _)| Some(*position) != own_position)
            .map(|(_, other)| other)
    };
    let value_of = |row: &Row, field: &str| row.get_by_name(field).cloned().unwrap_or(DatabaseValue::Null);

    for field in &table.fields {
        let value = value_of(row, &field.name);
        if field.is_not_null() && value.is_null() {
            return Err(ModelError::Database(format!(
                "null value in field '{}' of '{}' violates not-null constraint",
                field.name, entity
            )));
        }
        if field.is_unique()
            && !value.is_null()
            && others().any(|other| value_of(other, &field.name).loosely_equals(&value))
        {
            return Err(ModelError::Database(format!(
                "duplicate value {} for unique field '{}' of '{}'",
                value, field.name, entity
            )));
        }
    }

    for (name, index) in table.indexes.iter().filter(|(_, index)| index.unique) {
        let key: Vec<DatabaseValue> = index.fields.iter().map(|field| value_of(row, field)).collect();
        if key.iter().any(DatabaseValue::is_null) {
            continue;
        }
        let duplicate = others().any(|other| {
            index
                .fields
                .iter()
                .zip(&key)
                .all(|(field, value)| value_of(other, field).loosely_equals(value))
        });
        if duplicate {
            return Err(ModelError::Database(format!(
                "duplicate key violates unique index '{}' of '{}'",
                name, entity
            )));
        }
    }
    Ok(())
}

fn matches_all(row: &Row, filters: &[Filter]) -> ModelResult<bool> {
    for filter in filters {
        if !matches(row, filter)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Evaluate a filter tree against a row.
///
/// Empty `And` groups are true and empty `Or` groups false. Comparisons
/// against a null field are false in both directions, as in SQL.
fn matches(row: &Row, filter: &Filter) -> ModelResult<bool> {
    match filter {
        Filter::Group { filters, relation } => match relation {
            Relation::And => matches_all(row, filters),
            Relation::Or => {
                for filter in filters {
                    if matches(row, filter)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        },
        Filter::Basic { field, method, value } => {
            let actual = field_value(row, field)?;
            evaluate(field, actual, *method, value)
        }
    }
}

fn field_value<'r>(row: &'r Row, field: &str) -> ModelResult<&'r DatabaseValue> {
    row.get_by_name(field)
        .or_else(|| {
            field
                .rsplit_once('.')
                .and_then(|(_, name)| row.get_by_name(name))
        })
        .ok_or_else(|| ModelError::Database(format!("unknown field '{}'", field)))
}

fn evaluate(field: &str, actual: &DatabaseValue, method: FilterMethod, value: &Value) -> ModelResult<bool> {
    match method {
        FilterMethod::Equality { inverse } => match value {
            Value::Null => Ok(actual.is_null() != inverse),
            Value::Bind(expected) => {
                if actual.is_null() {
                    return Ok(false);
                }
                Ok(actual.loosely_equals(expected) != inverse)
            }
            Value::Group(_) => Err(single_value_expected(field)),
        },
        FilterMethod::Order { inverse, equality } => {
            let expected = match value {
                Value::Bind(expected) => expected,
                Value::Null => return Ok(false),
                Value::Group(_) => return Err(single_value_expected(field)),
            };
            Ok(match actual.compare(expected) {
                Some(Ordering::Equal) => equality,
                Some(Ordering::Greater) => !inverse,
                Some(Ordering::Less) => inverse,
                None => false,
            })
        }
        FilterMethod::Subset { inverse } => {
            let members: Vec<DatabaseValue> = match value {
                Value::Group(values) => values
                    .iter()
                    .map(|member| match member {
                        Value::Bind(member) => Ok(member.clone()),
                        Value::Null => Ok(DatabaseValue::Null),
                        Value::Group(_) => Err(single_value_expected(field)),
                    })
                    .collect::<ModelResult<_>>()?,
                Value::Bind(DatabaseValue::Array(values)) => values.clone(),
                Value::Bind(member) => vec![member.clone()],
                Value::Null => vec![DatabaseValue::Null],
            };
            if members.is_empty() {
                return Ok(inverse);
            }
            if actual.is_null() {
                return Ok(false);
            }
            // A NULL member makes a miss unknown, which never matches
            if members.iter().any(|member| actual.loosely_equals(member)) {
                Ok(!inverse)
            } else {
                Ok(inverse && !members.iter().any(DatabaseValue::is_null))
            }
        }
        FilterMethod::Contains { inverse, position } => {
            let needle = match value {
                Value::Bind(DatabaseValue::String(needle)) => needle,
                other => {
                    return Err(ModelError::Serialization(format!(
                        "pattern filter on '{}' requires a string, got {}",
                        field, other
                    )))
                }
            };
            let haystack = match actual {
                DatabaseValue::String(haystack) => haystack,
                _ => return Ok(false),
            };
            let found = match position {
                ContainsPosition::Prefix => haystack.starts_with(needle.as_str()),
                ContainsPosition::Suffix => haystack.ends_with(needle.as_str()),
                ContainsPosition::Anywhere => haystack.contains(needle.as_str()),
            };
            Ok(found != inverse)
        }
    }
}

fn single_value_expected(field: &str) -> ModelError {
    ModelError::Serialization(format!(
        "filter on '{}' expects a single value, got a group",
        field
    ))
}

fn compare_nullable(a: Option<&DatabaseValue>, b: Option<&DatabaseValue>) -> Ordering {
    let a = a.filter(|value| !value.is_null());
    let b = b.filter(|value| !value.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}
