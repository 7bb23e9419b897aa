//! Structured statements.
//!
//! Mappers describe each write or read as a [`Statement`]. A
//! [`Dialect`](crate::dialect::Dialect) renders it into query text for
//! text-based connections, while stores without a query language (the
//! in-memory and `Dragonfly` connections) interpret the structure directly.

use rowkeep_core::SelectQuery;
use rowkeep_types::Value;

/// Column-family write options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Time-to-live in seconds.
    pub ttl: Option<u32>,
    /// Write timestamp in microseconds.
    pub timestamp: Option<i64>,
}

impl WriteOptions {
    /// Whether no option is set.
    pub const fn is_empty(&self) -> bool {
        self.ttl.is_none() && self.timestamp.is_none()
    }

    /// The same options without the time-to-live.
    #[must_use]
    pub const fn without_ttl(self) -> Self {
        Self {
            ttl: None,
            timestamp: self.timestamp,
        }
    }
}

/// One `SET` clause of an update.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// `column = value`
    Set {
        /// Target column.
        column: String,
        /// New value.
        value: Value,
    },
    /// `column = column + amount`
    Delta {
        /// Counter column.
        column: String,
        /// Signed amount to add.
        amount: i64,
    },
}

impl Assignment {
    /// Column the assignment writes.
    pub fn column(&self) -> &str {
        match self {
            Self::Set { column, .. } | Self::Delta { column, .. } => column,
        }
    }
}

/// `INSERT` of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    /// Target table.
    pub table: String,
    /// Inserted columns, in order.
    pub columns: Vec<String>,
    /// One value per column.
    pub values: Vec<Value>,
    /// Identity columns of the table, in identity order.
    pub key_columns: Vec<String>,
    /// Write options.
    pub options: WriteOptions,
}

/// `UPDATE` of the row matching `keys`.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Target table.
    pub table: String,
    /// `SET` clauses, in order.
    pub assignments: Vec<Assignment>,
    /// Identity `(column, value)` pairs.
    pub keys: Vec<(String, Value)>,
    /// Write options.
    pub options: WriteOptions,
}

/// `DELETE` of the row matching `keys`.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    /// Target table.
    pub table: String,
    /// Identity `(column, value)` pairs.
    pub keys: Vec<(String, Value)>,
    /// Write options; only the timestamp applies.
    pub options: WriteOptions,
}

/// A statement a connection can execute.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Row insert.
    Insert(Insert),
    /// Keyed update.
    Update(Update),
    /// Keyed delete.
    Delete(Delete),
    /// Read query.
    Select(SelectQuery),
}

impl Statement {
    /// Table the statement targets.
    pub fn table(&self) -> &str {
        match self {
            Self::Insert(insert) => &insert.table,
            Self::Update(update) => &update.table,
            Self::Delete(delete) => &delete.table,
            Self::Select(select) => select.table(),
        }
    }

    /// Short verb used in logs.
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
            Self::Select(_) => "select",
        }
    }
}

/// A rendered statement: structure, query text and bound values.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// The statement this query was rendered from.
    pub statement: Statement,
    /// Query text in the connection's dialect.
    pub text: String,
    /// Values bound to the placeholders in `text`, in order.
    pub values: Vec<Value>,
}
