//! Store mappers and connections for the rowkeep data-access layer.
//!
//! Two [`DataStore`](rowkeep_core::DataStore) implementations translate
//! entity state into statements:
//!
//! ```text
//! Entity ──> QlDataStore  ──> Dialect::Postgres ──> PostgresConnection
//!        └─> CqlDataStore ──> Dialect::Cql ──────> DragonflyConnection
//!                                                  MemoryConnection
//! ```
//!
//! Both emit structured [`Statement`]s. The dialect renders them into text
//! for connections that speak a query language, while connections without
//! one interpret the structure directly.
//!
//! # Modules
//!
//! - [`ql_store`] -- Relational data store
//! - [`cql_store`] -- Column-family data store (TTL, timestamps, counters)
//! - [`statement`] -- Structured statements and write options
//! - [`dialect`] -- Rendering statements into query text
//! - [`connection`] -- The connection contract
//! - [`postgres`] -- `PostgreSQL` connection via sqlx
//! - [`dragonfly`] -- `Dragonfly` connection via fred
//! - [`memory`] -- In-process connection with a statement log
//! - [`config`] -- YAML store configuration
//! - [`bootstrap`] -- Registering configured stores
//! - [`error`] -- Connection errors

pub mod bootstrap;
pub mod config;
pub mod connection;
pub mod cql_store;
pub mod dialect;
pub mod dragonfly;
pub mod error;
mod mapper;
pub mod memory;
pub mod postgres;
pub mod ql_store;
pub mod statement;

// Re-export primary types for convenience.
pub use bootstrap::{StoreHandle, build_store, register_stores};
pub use config::{ConfigError, ConnectionConfig, DalConfig, MapperKind, StoreConfig, StoreKind};
pub use connection::QlConnection;
pub use cql_store::CqlDataStore;
pub use dialect::Dialect;
pub use dragonfly::DragonflyConnection;
pub use error::DbError;
pub use memory::MemoryConnection;
pub use postgres::{PostgresConfig, PostgresConnection};
pub use ql_store::QlDataStore;
pub use statement::{Assignment, Delete, Insert, Query, Statement, Update, WriteOptions};
