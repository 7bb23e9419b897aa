//! Relational data store.

use std::sync::Arc;

use crate::connection::QlConnection;
use crate::dialect::Dialect;
use crate::mapper::{Family, Mapper};

/// [`DataStore`](rowkeep_core::DataStore) for relational databases.
///
/// Writes go through `PostgreSQL` syntax with positional placeholders.
/// Entity write options (TTL, timestamp) are ignored. Counter properties
/// are inserted at their stored value and updated with `SET "c" = "c" + n`
/// statements.
#[derive(Clone)]
pub struct QlDataStore {
    mapper: Mapper,
}

impl QlDataStore {
    /// Store executing through `connection`.
    pub fn new(connection: Arc<dyn QlConnection>) -> Self {
        Self {
            mapper: Mapper::new(connection, Dialect::Postgres, Family::Relational),
        }
    }

    /// The connection statements run on.
    pub const fn connection(&self) -> &Arc<dyn QlConnection> {
        self.mapper.connection()
    }

    /// The dialect statements are rendered in.
    pub const fn dialect(&self) -> Dialect {
        self.mapper.dialect()
    }
}

impl std::fmt::Debug for QlDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QlDataStore")
            .field("connection", &self.connection().kind())
            .finish()
    }
}

crate::mapper::delegate_data_store!(QlDataStore);
