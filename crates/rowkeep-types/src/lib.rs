//! Shared value types for the rowkeep data-access layer.
//!
//! Everything an entity holds, and everything a store reads or writes, is
//! expressed with the types in this crate. They sit at the bottom of the
//! workspace so the entity model, the mappers and the connections all speak
//! the same vocabulary.
//!
//! # Modules
//!
//! - [`value`] -- Dynamically typed property value
//! - [`storage`] -- Per-property storage type tags and value coercion
//! - [`counter`] -- Delta-buffered accumulator for counter columns

pub mod counter;
pub mod storage;
pub mod value;

// Re-export all public types at crate root for convenience.
pub use counter::Counter;
pub use storage::StorageType;
pub use value::{Row, Value};
