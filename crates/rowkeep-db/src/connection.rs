//! The connection contract the mappers execute statements through.

use async_trait::async_trait;
use rowkeep_types::{Row, Value};

use crate::error::DbError;
use crate::statement::Query;

/// A live link to one backing store.
///
/// Connections open lazily: the first statement connects if
/// [`connect`](QlConnection::connect) was not called. Methods take `&self`
/// so one connection can be shared by several mappers.
#[async_trait]
pub trait QlConnection: Send + Sync {
    /// Short name of the store kind, used in logs.
    fn kind(&self) -> &'static str;

    /// Open the connection. Does nothing when already open.
    async fn connect(&self) -> Result<(), DbError>;

    /// Close the connection. Does nothing when already closed.
    async fn disconnect(&self) -> Result<(), DbError>;

    /// Whether the connection is open and answering.
    async fn is_connected(&self) -> bool;

    /// Execute a write statement and return the number of affected rows.
    async fn run_query(&self, query: &Query) -> Result<u64, DbError>;

    /// Execute a read statement and return every row.
    async fn fetch_query_results(&self, query: &Query) -> Result<Vec<Row>, DbError>;

    /// Value generated for the auto-increment column by the last insert.
    async fn last_insert_id(&self) -> Result<Option<Value>, DbError>;
}
