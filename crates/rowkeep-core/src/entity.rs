//! The entity state container.
//!
//! An [`Entity`] is one record of a store-backed type: a handle to its
//! [`Schema`] plus one value slot per declared property. It keeps a second
//! set of slots holding the values as of the last save or load checkpoint,
//! and derives its change set by comparing the two.
//!
//! # Invariants
//!
//! - The value slots always match the declared properties exactly. Unknown
//!   keys given to [`Entity::hydrate`] are dropped, never stored.
//! - The checkpoint only moves on [`Entity::mark_saved`] or
//!   [`Entity::mark_loaded`], never on a property write.
//! - Counter properties are excluded from [`Entity::changes`]; their
//!   pending deltas are reported by [`Entity::dirty_counters`].
//! - Identity is always derived from the id properties' current values.

use std::sync::Arc;

use rowkeep_types::storage::counter_total;
use rowkeep_types::{Counter, Row, Value};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::changes::{ChangeSet, PropertyChange};
use crate::error::{DalError, Result};
use crate::identity::Identity;
use crate::registry::StoreRegistry;
use crate::schema::Schema;

/// One in-memory record of a store-backed entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    schema: Arc<Schema>,
    values: Vec<Value>,
    originals: Vec<Value>,
    loaded: bool,
    store_name: String,
    ttl: Option<u32>,
    timestamp: Option<i64>,
}

impl Entity {
    /// Create an entity holding the schema defaults, not yet loaded.
    pub fn new(schema: &Arc<Schema>) -> Self {
        let values: Vec<Value> = schema
            .properties()
            .iter()
            .map(|p| p.default_value().clone())
            .collect();
        Self {
            schema: Arc::clone(schema),
            originals: values.clone(),
            values,
            loaded: false,
            store_name: schema.store_name().to_owned(),
            ttl: None,
            timestamp: None,
        }
    }

    /// The schema this entity was built from.
    pub const fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Entity type name.
    pub fn entity_type(&self) -> &str {
        self.schema.entity()
    }

    /// Whether the entity has been loaded from, or saved to, a store.
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Logical name of the store this entity resolves on every operation.
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Bind this instance to a different store name.
    pub fn set_store_name(&mut self, store_name: impl Into<String>) -> &mut Self {
        self.store_name = store_name.into();
        self
    }

    // =========================================================================
    // Property access
    // =========================================================================

    /// Names of all declared properties in declaration order.
    pub fn property_names(&self) -> Vec<&str> {
        self.schema.property_names()
    }

    /// Current value of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::UnknownProperty`] if `name` is not declared.
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.slot(name).and_then(|pos| self.value_at(pos, name))
    }

    /// Assign `value` to `name`.
    ///
    /// Counter properties only accept a [`Value::Counter`]; use
    /// [`counter_mut`](Self::counter_mut) to apply deltas.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::UnknownProperty`] if `name` is not declared and
    /// [`DalError::InvalidValue`] for a non-counter value on a counter.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let pos = self.slot(name)?;
        let value = value.into();
        let is_counter = self
            .schema
            .properties()
            .get(pos)
            .is_some_and(|p| p.storage().is_counter());
        if is_counter && !matches!(value, Value::Counter(_)) {
            return Err(self.invalid(name, "a counter"));
        }
        if let Some(slot) = self.values.get_mut(pos) {
            *slot = value;
        }
        Ok(self)
    }

    /// Counter held by `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::UnknownProperty`] if `name` is not declared and
    /// [`DalError::InvalidValue`] if it is not a counter.
    pub fn counter(&self, name: &str) -> Result<&Counter> {
        self.get(name)?
            .as_counter()
            .ok_or_else(|| self.invalid(name, "a counter"))
    }

    /// Mutable counter held by `name`.
    ///
    /// # Errors
    ///
    /// Same as [`counter`](Self::counter).
    pub fn counter_mut(&mut self, name: &str) -> Result<&mut Counter> {
        let pos = self.slot(name)?;
        let invalid = self.invalid(name, "a counter");
        self.values
            .get_mut(pos)
            .and_then(Value::as_counter_mut)
            .ok_or(invalid)
    }

    /// Current values of every declared property, in declaration order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .properties()
            .iter()
            .map(|p| p.name())
            .zip(self.values.iter())
    }

    /// Current values of every declared property as a row.
    pub fn property_data(&self) -> Row {
        self.properties()
            .map(|(name, value)| (name.to_owned(), value.clone()))
            .collect()
    }

    /// Assign every known key of `data`; unknown keys are ignored.
    ///
    /// With `from_store` set, values are coerced through each property's
    /// storage type first. Counter properties always end up holding a
    /// counter. The checkpoint is not touched.
    pub fn hydrate(&mut self, data: &Row, from_store: bool) -> &mut Self {
        for (property, slot) in self.schema.properties().iter().zip(self.values.iter_mut()) {
            let Some(raw) = data.get(property.name()) else {
                continue;
            };
            let storage = property.storage();
            if storage.is_counter() && counter_total(raw).is_none() {
                tracing::warn!(
                    entity = self.schema.entity(),
                    property = property.name(),
                    value = ?raw,
                    "Counter value is not numeric, starting from zero"
                );
            }
            *slot = if from_store || storage.is_counter() {
                storage.deserialize(raw.clone())
            } else {
                raw.clone()
            };
        }
        self
    }

    // =========================================================================
    // Change tracking
    // =========================================================================

    /// Properties whose value differs from the last checkpoint.
    ///
    /// Computed by comparing every value, so writing a property back to its
    /// original value removes it from the set. Counters are never included.
    pub fn changes(&self) -> ChangeSet {
        let changes = self
            .schema
            .properties()
            .iter()
            .zip(self.values.iter().zip(self.originals.iter()))
            .filter(|(property, (current, original))| {
                !property.storage().is_counter() && current != original
            })
            .map(|(property, (current, original))| PropertyChange {
                property: property.name().to_owned(),
                from: original.clone(),
                to: current.clone(),
            })
            .collect();
        ChangeSet::new(changes)
    }

    /// Counters with a non-zero pending delta, in declaration order.
    pub fn dirty_counters(&self) -> Vec<(&str, i64)> {
        self.properties()
            .filter_map(|(name, value)| {
                value
                    .as_counter()
                    .filter(|c| c.is_dirty())
                    .map(|c| (name, c.pending()))
            })
            .collect()
    }

    /// Whether a save would write anything.
    pub fn is_dirty(&self) -> bool {
        !self.loaded || !self.changes().is_empty() || !self.dirty_counters().is_empty()
    }

    /// Clear the pending delta of counter `name` after the store applied it.
    ///
    /// # Errors
    ///
    /// Same as [`counter_mut`](Self::counter_mut).
    pub fn commit_counter(&mut self, name: &str) -> Result<i64> {
        Ok(self.counter_mut(name)?.commit())
    }

    /// Move the checkpoint to the current values.
    pub fn mark_saved(&mut self) -> &mut Self {
        self.originals.clone_from(&self.values);
        self
    }

    /// Move the checkpoint and flag the entity as loaded.
    pub fn mark_loaded(&mut self) -> &mut Self {
        self.loaded = true;
        self.mark_saved()
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Names of the identity properties, in identity order.
    pub fn id_properties(&self) -> Vec<&str> {
        self.schema.id_properties()
    }

    /// `(property, current value)` pairs of the identity, in identity order.
    pub fn id_values(&self) -> Vec<(&str, &Value)> {
        self.schema
            .id_positions()
            .iter()
            .filter_map(|&pos| {
                let property = self.schema.properties().get(pos)?;
                let value = self.values.get(pos)?;
                Some((property.name(), value))
            })
            .collect()
    }

    /// Identity derived from the id properties' current values.
    ///
    /// A single id property gives its bare value unless `force_composite`
    /// is set.
    pub fn id(&self, force_composite: bool) -> Identity {
        let pairs = self.id_values();
        match (force_composite, pairs.as_slice()) {
            (false, [(_, value)]) => Identity::Single((*value).clone()),
            (_, all) => Identity::Composite(
                all.iter()
                    .map(|(name, value)| ((*name).to_owned(), (*value).clone()))
                    .collect(),
            ),
        }
    }

    /// Assign identity values to the id properties.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::InvalidValue`] when a single value is given for a
    /// composite identity or a composite entry names a non-id property, and
    /// [`DalError::UnknownProperty`] for undeclared names.
    pub fn set_id(&mut self, id: Identity) -> Result<&mut Self> {
        match id {
            Identity::Single(value) => {
                let name = match self.schema.id_properties().as_slice() {
                    [only] => (*only).to_owned(),
                    _ => {
                        let name = self.schema.id_properties().join(", ");
                        return Err(self.invalid(&name, "a composite identity"));
                    }
                };
                self.set(&name, value)
            }
            Identity::Composite(pairs) => {
                for (name, value) in pairs {
                    self.slot(&name)?;
                    if !self.schema.is_id(&name) {
                        return Err(self.invalid(&name, "an identity property"));
                    }
                    self.set(&name, value)?;
                }
                Ok(self)
            }
        }
    }

    // =========================================================================
    // Column-family write options
    // =========================================================================

    /// Time-to-live in seconds applied to the next writes.
    pub const fn ttl(&self) -> Option<u32> {
        self.ttl
    }

    /// Set or clear the time-to-live for subsequent writes.
    pub const fn set_ttl(&mut self, ttl: Option<u32>) -> &mut Self {
        self.ttl = ttl;
        self
    }

    /// Explicit write timestamp (microseconds) applied to the next writes.
    pub const fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// Set or clear the write timestamp for subsequent writes.
    pub const fn set_timestamp(&mut self, timestamp: Option<i64>) -> &mut Self {
        self.timestamp = timestamp;
        self
    }

    /// Use the current time, in microseconds since the epoch, as write timestamp.
    pub fn set_timestamp_now(&mut self) -> &mut Self {
        self.timestamp = Some(chrono::Utc::now().timestamp_micros());
        self
    }

    // =========================================================================
    // Store operations
    // =========================================================================

    /// Persist through the store this entity is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::StoreNotFound`] if the store name is unbound, or
    /// whatever the store reports.
    pub async fn save(&mut self, registry: &StoreRegistry) -> Result<()> {
        let store = registry.resolve(&self.store_name)?;
        store.save(self).await
    }

    /// Reload from the store this entity is bound to, keyed by identity.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::NotFound`] when no row matches.
    pub async fn load(&mut self, registry: &StoreRegistry) -> Result<()> {
        let store = registry.resolve(&self.store_name)?;
        store.load(self).await
    }

    /// Delete the stored record. Returns the number of affected rows.
    ///
    /// The in-memory entity is left as is; treat it as stale afterwards.
    pub async fn delete(&self, registry: &StoreRegistry) -> Result<u64> {
        let store = registry.resolve(&self.store_name)?;
        store.delete(self).await
    }

    /// Whether a record with this identity exists in the store.
    pub async fn exists(&self, registry: &StoreRegistry) -> Result<bool> {
        let store = registry.resolve(&self.store_name)?;
        store.exists(self).await
    }

    /// Build an entity of `schema` with the given identity and load it.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::NotFound`] when no row matches, or any error from
    /// [`set_id`](Self::set_id) or the store.
    pub async fn load_by_id(
        schema: &Arc<Schema>,
        registry: &StoreRegistry,
        id: impl Into<Identity> + Send,
    ) -> Result<Self> {
        let mut entity = Self::new(schema);
        entity.set_id(id.into())?;
        entity.load(registry).await?;
        Ok(entity)
    }

    /// JSON object of the current property values.
    ///
    /// Key order follows [`serde_json::Map`], which sorts keys. Serialize the
    /// entity itself to keep declaration order.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.properties()
                .map(|(name, value)| (name.to_owned(), value.to_json()))
                .collect(),
        )
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn slot(&self, name: &str) -> Result<usize> {
        self.schema
            .position(name)
            .ok_or_else(|| DalError::UnknownProperty {
                entity: self.schema.entity().to_owned(),
                property: name.to_owned(),
            })
    }

    fn value_at(&self, pos: usize, name: &str) -> Result<&Value> {
        self.values
            .get(pos)
            .ok_or_else(|| DalError::UnknownProperty {
                entity: self.schema.entity().to_owned(),
                property: name.to_owned(),
            })
    }

    fn invalid(&self, name: &str, expected: &'static str) -> DalError {
        DalError::InvalidValue {
            entity: self.schema.entity().to_owned(),
            property: name.to_owned(),
            expected,
        }
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.properties() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
