//! Query Builder filter operations

use super::builder::QueryBuilder;
use super::types::*;
use crate::model::Model;

impl<M: Model> QueryBuilder<M> {
    /// Append a filter node
    pub fn filter(mut self, filter: Filter) -> Self {
        self.query.filters.push(filter);
        self
    }

    pub fn filter_by(self, field: &str, method: FilterMethod, value: impl Into<Value>) -> Self {
        self.filter(Filter::basic(field, method, value))
    }

    /// Append a group whose filters are built by `build` and combined with
    /// `relation`.
    ///
    /// An empty AND group matches every row and an empty OR group none.
    pub fn group<F>(self, relation: Relation, build: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        let nested = build(self.scratch());
        self.filter(Filter::group(nested.query.filters, relation))
    }

    /// Add WHERE condition with equality
    pub fn filter_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter_by(field, FilterMethod::EQUAL, value)
    }

    pub fn filter_ne(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter_by(field, FilterMethod::NOT_EQUAL, value)
    }

    pub fn filter_gt(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter_by(field, FilterMethod::GREATER_THAN, value)
    }

    pub fn filter_gte(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter_by(field, FilterMethod::GREATER_THAN_OR_EQUAL, value)
    }

    pub fn filter_lt(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter_by(field, FilterMethod::LESS_THAN, value)
    }

    pub fn filter_lte(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter_by(field, FilterMethod::LESS_THAN_OR_EQUAL, value)
    }

    /// Add WHERE IN condition; an empty list matches nothing
    pub fn filter_in<I, V>(self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = Value::Group(values.into_iter().map(Into::into).collect());
        self.filter_by(field, FilterMethod::IN, values)
    }

    /// Add WHERE NOT IN condition; an empty list matches everything
    pub fn filter_not_in<I, V>(self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = Value::Group(values.into_iter().map(Into::into).collect());
        self.filter_by(field, FilterMethod::NOT_IN, values)
    }

    pub fn filter_contains(self, field: &str, needle: &str) -> Self {
        self.filter_pattern(field, needle, ContainsPosition::Anywhere)
    }

    pub fn filter_starts_with(self, field: &str, prefix: &str) -> Self {
        self.filter_pattern(field, prefix, ContainsPosition::Prefix)
    }

    pub fn filter_ends_with(self, field: &str, suffix: &str) -> Self {
        self.filter_pattern(field, suffix, ContainsPosition::Suffix)
    }

    fn filter_pattern(self, field: &str, needle: &str, position: ContainsPosition) -> Self {
        let method = FilterMethod::Contains {
            inverse: false,
            position,
        };
        self.filter_by(field, method, needle)
    }

    /// Add WHERE IS NULL condition
    pub fn filter_null(self, field: &str) -> Self {
        self.filter_by(field, FilterMethod::EQUAL, Value::Null)
    }

    pub fn filter_not_null(self, field: &str) -> Self {
        self.filter_by(field, FilterMethod::NOT_EQUAL, Value::Null)
    }
}
