//! Column-family data store.
//!
//! Same contract as [`QlDataStore`](crate::QlDataStore) with the extras a
//! wide-column store offers:
//!
//! - `USING TTL n` and `USING TIMESTAMP t` taken from the entity on every
//!   write, `USING TTL n AND TIMESTAMP t` when both are set.
//! - Counter columns only ever change through delta updates. Those never
//!   carry a TTL, and a new entity of a counter table emits no `INSERT`.
//! - Each counter delta is committed on the entity as soon as its statement
//!   succeeds. A failure part-way leaves the earlier deltas applied.

use std::sync::Arc;

use crate::connection::QlConnection;
use crate::dialect::Dialect;
use crate::mapper::{Family, Mapper};

/// [`DataStore`](rowkeep_core::DataStore) for column-family stores speaking CQL.
#[derive(Clone)]
pub struct CqlDataStore {
    mapper: Mapper,
}

impl CqlDataStore {
    /// Store executing through `connection`.
    pub fn new(connection: Arc<dyn QlConnection>) -> Self {
        Self {
            mapper: Mapper::new(connection, Dialect::Cql, Family::ColumnFamily),
        }
    }

    /// The connection statements run on.
    pub const fn connection(&self) -> &Arc<dyn QlConnection> {
        self.mapper.connection()
    }
}

impl std::fmt::Debug for CqlDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CqlDataStore")
            .field("connection", &self.connection().kind())
            .finish()
    }
}

crate::mapper::delegate_data_store!(CqlDataStore);
