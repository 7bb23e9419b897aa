//! Change-tracking entity model for the rowkeep data-access layer.
//!
//! This crate holds everything that does not depend on a particular
//! store:
//!
//! - [`Schema`] and [`Entity`]: runtime entity descriptors and the state
//!   container that diffs current values against the last checkpoint.
//! - [`StoreRegistry`] and the [`DataStore`] trait that mappers implement.
//! - [`SelectQuery`] and [`Collection`] for reading many entities.
//! - [`DalError`], the error type shared by every rowkeep crate.

pub mod changes;
pub mod collection;
pub mod entity;
pub mod error;
pub mod identity;
pub mod query;
pub mod registry;
pub mod schema;
pub mod store;

pub use changes::{ChangeSet, PropertyChange};
pub use collection::{Collection, Entities};
pub use entity::Entity;
pub use error::{BoxError, DalError, Operation, Result};
pub use identity::Identity;
pub use query::{Predicate, SelectQuery};
pub use registry::StoreRegistry;
pub use schema::{DEFAULT_ID_PROPERTY, DEFAULT_STORE_NAME, PropertyDef, Schema, SchemaBuilder};
pub use store::DataStore;
