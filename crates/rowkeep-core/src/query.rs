//! Caller-built read queries.
//!
//! A [`SelectQuery`] is a table, an optional column list, a conjunction of
//! [`Predicate`]s and an optional limit. Mappers render it into their own
//! dialect; stores that cannot filter natively evaluate it in process with
//! [`SelectQuery::matches`].

use std::cmp::Ordering;

use rowkeep_types::{Row, Value};

/// One condition on a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `field = value`
    Eq(String, Value),
    /// `field <> value`
    NotEq(String, Value),
    /// `field < value`
    Lt(String, Value),
    /// `field <= value`
    Lte(String, Value),
    /// `field > value`
    Gt(String, Value),
    /// `field >= value`
    Gte(String, Value),
    /// `field IN (values...)`
    In(String, Vec<Value>),
    /// `field IS NULL`
    IsNull(String),
    /// `field IS NOT NULL`
    IsNotNull(String),
}

impl Predicate {
    /// `field = value`
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    /// `field <> value`
    pub fn not_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::NotEq(field.into(), value.into())
    }

    /// `field < value`
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt(field.into(), value.into())
    }

    /// `field <= value`
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lte(field.into(), value.into())
    }

    /// `field > value`
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt(field.into(), value.into())
    }

    /// `field >= value`
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte(field.into(), value.into())
    }

    /// `field IN (values...)`
    pub fn is_in<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    /// `field IS NULL`
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::IsNull(field.into())
    }

    /// `field IS NOT NULL`
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::IsNotNull(field.into())
    }

    /// Column the predicate applies to.
    pub fn field(&self) -> &str {
        match self {
            Self::Eq(f, _)
            | Self::NotEq(f, _)
            | Self::Lt(f, _)
            | Self::Lte(f, _)
            | Self::Gt(f, _)
            | Self::Gte(f, _)
            | Self::In(f, _)
            | Self::IsNull(f)
            | Self::IsNotNull(f) => f,
        }
    }

    /// Evaluate against a row.
    ///
    /// A missing column reads as `Null`. As in SQL, comparisons against
    /// `Null` never match; use [`Predicate::IsNull`] instead.
    pub fn matches(&self, row: &Row) -> bool {
        let actual = row.get(self.field()).unwrap_or(&Value::Null);
        match self {
            Self::Eq(_, v) => actual.compare(v) == Some(Ordering::Equal),
            Self::NotEq(_, v) => actual
                .compare(v)
                .is_some_and(|ord| ord != Ordering::Equal),
            Self::Lt(_, v) => actual.compare(v) == Some(Ordering::Less),
            Self::Lte(_, v) => matches!(
                actual.compare(v),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::Gt(_, v) => actual.compare(v) == Some(Ordering::Greater),
            Self::Gte(_, v) => matches!(
                actual.compare(v),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::In(_, values) => values
                .iter()
                .any(|v| actual.compare(v) == Some(Ordering::Equal)),
            Self::IsNull(_) => actual.is_null(),
            Self::IsNotNull(_) => !actual.is_null(),
        }
    }
}

/// A read query against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    table: String,
    columns: Vec<String>,
    predicates: Vec<Predicate>,
    limit: Option<u64>,
    allow_filtering: bool,
}

impl SelectQuery {
    /// Select every column of `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            predicates: Vec::new(),
            limit: None,
            allow_filtering: false,
        }
    }

    /// Restrict the selected columns. An empty list selects all columns.
    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Add a predicate; all predicates must hold.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Return at most `limit` rows.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Let column-family stores filter on non-key columns.
    #[must_use]
    pub const fn allow_filtering(mut self) -> Self {
        self.allow_filtering = true;
        self
    }

    /// Target table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Selected columns; empty means all.
    pub fn selected_columns(&self) -> &[String] {
        &self.columns
    }

    /// Conjunction of predicates.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Row limit, if any.
    pub const fn row_limit(&self) -> Option<u64> {
        self.limit
    }

    /// Whether `ALLOW FILTERING` was requested.
    pub const fn filtering_allowed(&self) -> bool {
        self.allow_filtering
    }

    /// Whether `row` satisfies every predicate.
    pub fn matches(&self, row: &Row) -> bool {
        self.predicates.iter().all(|p| p.matches(row))
    }

    /// Keep only the selected columns of `row`.
    pub fn project(&self, row: Row) -> Row {
        if self.columns.is_empty() {
            return row;
        }
        row.into_iter()
            .filter(|(column, _)| self.columns.contains(column))
            .collect()
    }
}
