//! The store contract every persistence mapper implements.

use async_trait::async_trait;
use rowkeep_types::Row;

use crate::entity::Entity;
use crate::error::Result;
use crate::query::SelectQuery;

/// A backing store able to persist and read entities.
///
/// Implementations translate entity state into statements for one kind of
/// store. Calls are awaited one at a time by the caller; an implementation
/// never runs statements for the same entity in parallel.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Insert a new entity or update the changed properties of a loaded one.
    ///
    /// On success the entity is marked loaded and its change set is empty.
    async fn save(&self, entity: &mut Entity) -> Result<()>;

    /// Populate the entity from the row matching its identity.
    async fn load(&self, entity: &mut Entity) -> Result<()>;

    /// Remove the row matching the entity's identity.
    ///
    /// Returns the number of affected rows.
    async fn delete(&self, entity: &Entity) -> Result<u64>;

    /// Whether a row matching the entity's identity exists.
    async fn exists(&self, entity: &Entity) -> Result<bool>;

    /// Run a caller-built read query and return the raw rows.
    async fn get_data(&self, query: &SelectQuery) -> Result<Vec<Row>>;
}
