//! Query IR - backend-agnostic description of a CRUD operation
//!
//! A [`DatabaseQuery`] is assembled by the [`QueryBuilder`](super::QueryBuilder),
//! handed to a connection and discarded once the result is back. Backends
//! never see builder state, only this structure.

use std::fmt;

use crate::backends::DatabaseValue;

/// What the query does to the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryAction {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for QueryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryAction::Create => write!(f, "CREATE"),
            QueryAction::Read => write!(f, "READ"),
            QueryAction::Update => write!(f, "UPDATE"),
            QueryAction::Delete => write!(f, "DELETE"),
        }
    }
}

/// A filter right-hand side or an input value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bind(DatabaseValue),
    Group(Vec<Value>),
    Null,
}

impl Value {
    /// Flatten into the scalar values that would be bound for this value
    pub fn binds(&self) -> Vec<DatabaseValue> {
        match self {
            Value::Bind(value) => vec![value.clone()],
            Value::Group(values) => values.iter().flat_map(Value::binds).collect(),
            Value::Null => Vec::new(),
        }
    }
}

impl<T: Into<DatabaseValue>> From<T> for Value {
    fn from(value: T) -> Self {
        match value.into() {
            DatabaseValue::Null => Value::Null,
            value => Value::Bind(value),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bind(value) => write!(f, "{}", value),
            Value::Null => write!(f, "NULL"),
            Value::Group(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

/// Where a `contains` filter anchors its pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainsPosition {
    Prefix,
    Suffix,
    Anywhere,
}

/// Comparison applied by a basic filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMethod {
    /// `=` or, inverted, `!=`
    Equality { inverse: bool },
    /// `>` / `>=` or, inverted, `<` / `<=`
    Order { inverse: bool, equality: bool },
    /// `IN` or, inverted, `NOT IN`
    Subset { inverse: bool },
    /// Pattern match anchored at `position`
    Contains {
        inverse: bool,
        position: ContainsPosition,
    },
}

impl FilterMethod {
    pub const EQUAL: FilterMethod = FilterMethod::Equality { inverse: false };
    pub const NOT_EQUAL: FilterMethod = FilterMethod::Equality { inverse: true };
    pub const GREATER_THAN: FilterMethod = FilterMethod::Order {
        inverse: false,
        equality: false,
    };
    pub const GREATER_THAN_OR_EQUAL: FilterMethod = FilterMethod::Order {
        inverse: false,
        equality: true,
    };
    pub const LESS_THAN: FilterMethod = FilterMethod::Order {
        inverse: true,
        equality: false,
    };
    pub const LESS_THAN_OR_EQUAL: FilterMethod = FilterMethod::Order {
        inverse: true,
        equality: true,
    };
    pub const IN: FilterMethod = FilterMethod::Subset { inverse: false };
    pub const NOT_IN: FilterMethod = FilterMethod::Subset { inverse: true };
}

impl fmt::Display for FilterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterMethod::Equality { inverse: false } => write!(f, "="),
            FilterMethod::Equality { inverse: true } => write!(f, "!="),
            FilterMethod::Order { inverse: false, equality: false } => write!(f, ">"),
            FilterMethod::Order { inverse: false, equality: true } => write!(f, ">="),
            FilterMethod::Order { inverse: true, equality: false } => write!(f, "<"),
            FilterMethod::Order { inverse: true, equality: true } => write!(f, "<="),
            FilterMethod::Subset { inverse: false } => write!(f, "IN"),
            FilterMethod::Subset { inverse: true } => write!(f, "NOT IN"),
            FilterMethod::Contains { inverse, position } => {
                let anchor = match position {
                    ContainsPosition::Prefix => "PREFIX",
                    ContainsPosition::Suffix => "SUFFIX",
                    ContainsPosition::Anywhere => "ANYWHERE",
                };
                if *inverse {
                    write!(f, "NOT CONTAINS {}", anchor)
                } else {
                    write!(f, "CONTAINS {}", anchor)
                }
            }
        }
    }
}

/// How the filters of a group combine.
///
/// An empty `And` group is `true` and an empty `Or` group is `false`, the
/// identity elements of each relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    And,
    Or,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::And => write!(f, "AND"),
            Relation::Or => write!(f, "OR"),
        }
    }
}

/// Recursive filter tree
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Basic {
        field: String,
        method: FilterMethod,
        value: Value,
    },
    Group {
        filters: Vec<Filter>,
        relation: Relation,
    },
}

impl Filter {
    pub fn basic(field: impl Into<String>, method: FilterMethod, value: impl Into<Value>) -> Self {
        Filter::Basic {
            field: field.into(),
            method,
            value: value.into(),
        }
    }

    pub fn group(filters: Vec<Filter>, relation: Relation) -> Self {
        Filter::Group { filters, relation }
    }

    fn collect_binds(&self, binds: &mut Vec<DatabaseValue>) {
        match self {
            Filter::Basic { value, .. } => binds.extend(value.binds()),
            Filter::Group { filters, .. } => {
                for filter in filters {
                    filter.collect_binds(binds);
                }
            }
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Basic { field, method, value } => write!(f, "{} {} {}", field, method, value),
            Filter::Group { filters, relation } => {
                let parts: Vec<String> = filters.iter().map(|filter| filter.to_string()).collect();
                write!(f, "({})", parts.join(&format!(" {} ", relation)))
            }
        }
    }
}

/// Join types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinMethod {
    #[default]
    Inner,
    Left,
    Right,
    Outer,
}

impl fmt::Display for JoinMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinMethod::Inner => write!(f, "INNER JOIN"),
            JoinMethod::Left => write!(f, "LEFT JOIN"),
            JoinMethod::Right => write!(f, "RIGHT JOIN"),
            JoinMethod::Outer => write!(f, "FULL OUTER JOIN"),
        }
    }
}

/// A field qualified by the entity it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub entity: String,
    pub field: String,
}

impl FieldRef {
    pub fn new(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            field: field.into(),
        }
    }

    /// `entity.field` form
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.entity, self.field)
    }
}

/// Join clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub method: JoinMethod,
    pub base_field: FieldRef,
    pub joined_field: FieldRef,
}

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: OrderDirection,
}

/// Aggregate computed by a Read instead of returning rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// Row count, returned in a single row under the `count` column
    Count,
}

/// Column name under which an aggregate result is returned
pub const AGGREGATE_COLUMN: &str = "count";

/// Input row for Create and Update
pub type InputRow = Vec<(String, Value)>;

/// Backend-agnostic description of a CRUD operation
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseQuery {
    pub entity: String,
    pub action: QueryAction,
    /// Projection; empty means every field
    pub fields: Vec<String>,
    /// Top-level filters, combined with AND
    pub filters: Vec<Filter>,
    pub joins: Vec<Join>,
    pub input: Vec<InputRow>,
    pub sorts: Vec<Sort>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub aggregate: Option<Aggregate>,
}

impl DatabaseQuery {
    pub fn new(entity: impl Into<String>, action: QueryAction) -> Self {
        Self {
            entity: entity.into(),
            action,
            fields: Vec::new(),
            filters: Vec::new(),
            joins: Vec::new(),
            input: Vec::new(),
            sorts: Vec::new(),
            limit: None,
            offset: None,
            aggregate: None,
        }
    }

    /// Every scalar value this query carries, in input-then-filter order
    pub fn bound_values(&self) -> Vec<DatabaseValue> {
        let mut binds: Vec<DatabaseValue> = self
            .input
            .iter()
            .flat_map(|row| row.iter().flat_map(|(_, value)| value.binds()))
            .collect();
        for filter in &self.filters {
            filter.collect_binds(&mut binds);
        }
        binds
    }
}

impl fmt::Display for DatabaseQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.entity)?;
        if let Some(Aggregate::Count) = self.aggregate {
            write!(f, " COUNT")?;
        }
        if !self.fields.is_empty() {
            write!(f, " FIELDS [{}]", self.fields.join(", "))?;
        }
        for join in &self.joins {
            write!(
                f,
                " {} {} ON {} = {}",
                join.method,
                join.joined_field.entity,
                join.base_field.qualified(),
                join.joined_field.qualified()
            )?;
        }
        if !self.input.is_empty() {
            let rows: Vec<String> = self
                .input
                .iter()
                .map(|row| {
                    let pairs: Vec<String> = row
                        .iter()
                        .map(|(field, value)| format!("{}: {}", field, value))
                        .collect();
                    format!("{{{}}}", pairs.join(", "))
                })
                .collect();
            write!(f, " INPUT [{}]", rows.join(", "))?;
        }
        if !self.filters.is_empty() {
            let filters: Vec<String> = self.filters.iter().map(|filter| filter.to_string()).collect();
            write!(f, " WHERE {}", filters.join(" AND "))?;
        }
        if !self.sorts.is_empty() {
            let sorts: Vec<String> = self
                .sorts
                .iter()
                .map(|sort| format!("{} {}", sort.field, sort.direction))
                .collect();
            write!(f, " SORT {}", sorts.join(", "))?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        if let Some(offset) = self.offset {
            write!(f, " OFFSET {}", offset)?;
        }
        Ok(())
    }
}
