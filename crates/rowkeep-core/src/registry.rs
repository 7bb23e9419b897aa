//! Named store registry.
//!
//! Entities hold only a store name. The registry maps those names to live
//! [`DataStore`] handles and is passed explicitly to every operation, so a
//! rebinding takes effect on the next call without touching the entities.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{DalError, Result};
use crate::store::DataStore;

/// Mapping from store name to store handle.
#[derive(Default)]
pub struct StoreRegistry {
    stores: RwLock<HashMap<String, Arc<dyn DataStore>>>,
}

impl StoreRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the registry to empty. Safe to call repeatedly.
    ///
    /// Must not race with resolutions that expect the old bindings.
    pub fn boot(&self) {
        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        if !stores.is_empty() {
            tracing::debug!(stores = stores.len(), "Clearing store registry");
        }
        stores.clear();
    }

    /// Bind `name` to `store`, replacing any previous binding.
    pub fn add_store(&self, name: impl Into<String>, store: Arc<dyn DataStore>) {
        let name = name.into();
        tracing::debug!(store = %name, "Registered data store");
        self.stores
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, store);
    }

    /// Look up the store bound to `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::StoreNotFound`] if nothing is bound to `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn DataStore>> {
        self.stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| DalError::StoreNotFound(name.to_owned()))
    }

    /// Remove the binding for `name`, returning the store it held.
    pub fn remove_store(&self, name: &str) -> Option<Arc<dyn DataStore>> {
        self.stores
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Whether `name` is bound.
    pub fn has_store(&self, name: &str) -> bool {
        self.stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Bound store names, sorted.
    pub fn store_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("stores", &self.store_names())
            .finish()
    }
}
