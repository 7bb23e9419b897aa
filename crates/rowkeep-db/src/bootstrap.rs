//! Registering configured stores.
//!
//! Turns each [`StoreConfig`] into a connection and a mapper, opens the
//! connection, and binds the resulting [`DataStore`] in a
//! [`StoreRegistry`] under the configured name.

use std::sync::Arc;

use rowkeep_core::{DalError, DataStore, Operation, StoreRegistry};

use crate::config::{DalConfig, MapperKind, StoreConfig, StoreKind};
use crate::connection::QlConnection;
use crate::cql_store::CqlDataStore;
use crate::dragonfly::DragonflyConnection;
use crate::memory::MemoryConnection;
use crate::postgres::{PostgresConfig, PostgresConnection};
use crate::ql_store::QlDataStore;

/// A store registered by [`register_stores`].
#[derive(Clone)]
pub struct StoreHandle {
    /// Name the store is bound to.
    pub name: String,
    /// Connection kind.
    pub kind: StoreKind,
    /// Mapper in front of the connection.
    pub mapper: MapperKind,
    /// The open connection.
    pub connection: Arc<dyn QlConnection>,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("mapper", &self.mapper)
            .finish_non_exhaustive()
    }
}

/// Build the connection and data store for `config` without connecting.
///
/// # Errors
///
/// Returns [`DalError::Config`] if the connection settings are invalid.
pub fn build_store(
    config: &StoreConfig,
) -> Result<(Arc<dyn QlConnection>, Arc<dyn DataStore>), DalError> {
    let connection: Arc<dyn QlConnection> = match config.kind {
        StoreKind::Postgres => Arc::new(PostgresConnection::new(PostgresConfig::from_settings(
            &config.connection,
        )?)),
        StoreKind::Dragonfly => Arc::new(DragonflyConnection::from_settings(&config.connection)?),
        StoreKind::Memory => Arc::new(MemoryConnection::new()),
    };
    let store: Arc<dyn DataStore> = match config.mapper() {
        MapperKind::Relational => Arc::new(QlDataStore::new(Arc::clone(&connection))),
        MapperKind::ColumnFamily => Arc::new(CqlDataStore::new(Arc::clone(&connection))),
    };
    Ok((connection, store))
}

/// Connect every configured store and bind it in `registry`.
///
/// Stores are processed in name order. The first failure stops the
/// bootstrap; stores registered before it stay registered.
///
/// # Errors
///
/// Returns [`DalError::Config`] for invalid settings, or the connection
/// failure wrapped with [`Operation::Connect`] and the store name.
pub async fn register_stores(
    registry: &StoreRegistry,
    config: &DalConfig,
) -> Result<Vec<StoreHandle>, DalError> {
    let mut handles = Vec::with_capacity(config.stores.len());
    for (name, store_config) in &config.stores {
        let (connection, store) = build_store(store_config)?;
        connection
            .connect()
            .await
            .map_err(|e| DalError::from(e).context(Operation::Connect, name))?;

        registry.add_store(name.as_str(), store);
        tracing::info!(
            store = %name,
            kind = connection.kind(),
            mapper = ?store_config.mapper(),
            "Registered data store"
        );
        handles.push(StoreHandle {
            name: name.clone(),
            kind: store_config.kind,
            mapper: store_config.mapper(),
            connection,
        });
    }
    Ok(handles)
}
