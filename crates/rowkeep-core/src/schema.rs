//! Entity schema descriptors.
//!
//! An entity type is described at runtime by a [`Schema`]: its name, the
//! table it maps to, the store it is bound to by default, and an ordered
//! list of [`PropertyDef`]s. Entities hold an `Arc<Schema>` and a value
//! slot per declared property, so there is no reflection over struct fields.
//!
//! ```
//! use rowkeep_core::{PropertyDef, Schema};
//! use rowkeep_types::StorageType;
//!
//! # fn main() -> Result<(), rowkeep_core::DalError> {
//! let schema = Schema::builder("User")
//!     .table("users")
//!     .store("main")
//!     .property(PropertyDef::new("name"))
//!     .property(PropertyDef::new("email").with_default("nobody@example.com").id())
//!     .property(PropertyDef::new("logins").with_storage(StorageType::Counter))
//!     .build()?;
//! assert_eq!(schema.id_properties(), ["email"]);
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use rowkeep_types::{StorageType, Value};

use crate::error::{DalError, Result};

/// Store name used when a schema does not name one.
pub const DEFAULT_STORE_NAME: &str = "default";

/// Property used as identity when no property is flagged as an id.
pub const DEFAULT_ID_PROPERTY: &str = "id";

/// Declaration of a single entity property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    name: String,
    default: Value,
    storage: StorageType,
    id: bool,
}

impl PropertyDef {
    /// Declare an opaque property defaulting to `Null`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: Value::Null,
            storage: StorageType::Opaque,
            id: false,
        }
    }

    /// Declare a counter property.
    pub fn counter(name: impl Into<String>) -> Self {
        Self::new(name).with_storage(StorageType::Counter)
    }

    /// Set the value a new entity starts with.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    /// Set the storage type tag.
    #[must_use]
    pub const fn with_storage(mut self, storage: StorageType) -> Self {
        self.storage = storage;
        self
    }

    /// Mark the property as part of the identity.
    #[must_use]
    pub const fn id(mut self) -> Self {
        self.id = true;
        self
    }

    /// Property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default value.
    pub const fn default_value(&self) -> &Value {
        &self.default
    }

    /// Storage type tag.
    pub const fn storage(&self) -> StorageType {
        self.storage
    }

    /// Whether the property is flagged as part of the identity.
    pub const fn is_id(&self) -> bool {
        self.id
    }
}

/// Runtime description of an entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    entity: String,
    table: String,
    store_name: String,
    properties: Vec<PropertyDef>,
    id_positions: Vec<usize>,
    auto_increment: Option<usize>,
}

impl Schema {
    /// Start describing the entity type `entity`.
    pub fn builder(entity: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            entity: entity.into(),
            table: None,
            store_name: None,
            properties: Vec::new(),
            id_properties: None,
            auto_increment: None,
        }
    }

    /// Entity type name, used in logs and errors.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Table (or column family) the entity maps to.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Store name new entities are bound to.
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Declared properties in declaration order.
    pub fn properties(&self) -> &[PropertyDef] {
        &self.properties
    }

    /// Names of all declared properties in declaration order.
    pub fn property_names(&self) -> Vec<&str> {
        self.properties.iter().map(PropertyDef::name).collect()
    }

    /// Look up a property declaration by name.
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Slot index of a property.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    /// Names of the identity properties, in identity order.
    pub fn id_properties(&self) -> Vec<&str> {
        self.id_positions
            .iter()
            .filter_map(|&i| self.properties.get(i))
            .map(PropertyDef::name)
            .collect()
    }

    /// Slot indexes of the identity properties, in identity order.
    pub(crate) fn id_positions(&self) -> &[usize] {
        &self.id_positions
    }

    /// Whether `name` is part of the identity.
    pub fn is_id(&self, name: &str) -> bool {
        self.position(name)
            .is_some_and(|pos| self.id_positions.contains(&pos))
    }

    /// Property whose value is generated by the store on insert.
    pub fn auto_increment(&self) -> Option<&str> {
        self.auto_increment
            .and_then(|i| self.properties.get(i))
            .map(PropertyDef::name)
    }

    /// Whether any property is a counter.
    pub fn has_counters(&self) -> bool {
        self.properties.iter().any(|p| p.storage.is_counter())
    }

    /// Whether every non-identity property is a counter.
    ///
    /// Column-family stores only accept counter updates on such tables.
    pub fn is_counter_table(&self) -> bool {
        self.has_counters()
            && self
                .properties
                .iter()
                .enumerate()
                .filter(|(i, _)| !self.id_positions.contains(i))
                .all(|(_, p)| p.storage.is_counter())
    }
}

/// Builder for [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    entity: String,
    table: Option<String>,
    store_name: Option<String>,
    properties: Vec<PropertyDef>,
    id_properties: Option<Vec<String>>,
    auto_increment: Option<String>,
}

impl SchemaBuilder {
    /// Table name. Defaults to the lowercased entity name.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Default store name. Defaults to [`DEFAULT_STORE_NAME`].
    #[must_use]
    pub fn store(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = Some(store_name.into());
        self
    }

    /// Append a property declaration.
    #[must_use]
    pub fn property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    /// Set the identity explicitly, in the given order.
    ///
    /// Overrides any properties flagged with [`PropertyDef::id`].
    #[must_use]
    pub fn id_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.id_properties = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Mark a property as generated by the store on insert.
    #[must_use]
    pub fn auto_increment(mut self, name: impl Into<String>) -> Self {
        self.auto_increment = Some(name.into());
        self
    }

    /// Validate the declarations and build the schema.
    ///
    /// Identity resolution: an explicit [`id_properties`](Self::id_properties)
    /// list wins, then properties flagged as ids in declaration order, then
    /// the property named [`DEFAULT_ID_PROPERTY`].
    ///
    /// # Errors
    ///
    /// Returns [`DalError::Schema`] when there are no properties, a name is
    /// declared twice, the identity names an undeclared or counter property,
    /// or the auto-increment property is undeclared or a counter.
    pub fn build(self) -> Result<Arc<Schema>> {
        let entity = self.entity;
        if self.properties.is_empty() {
            return Err(DalError::Schema(format!("{entity} declares no properties")));
        }

        let mut seen = HashSet::new();
        let mut properties = Vec::with_capacity(self.properties.len());
        for mut property in self.properties {
            if !seen.insert(property.name.clone()) {
                return Err(DalError::Schema(format!(
                    "{entity} declares `{}` twice",
                    property.name
                )));
            }
            property.default = property.storage.deserialize(property.default);
            properties.push(property);
        }

        let position = |name: &str| properties.iter().position(|p| p.name == name);

        let id_names: Vec<String> = match self.id_properties {
            Some(names) => names,
            None => {
                let flagged: Vec<String> = properties
                    .iter()
                    .filter(|p| p.id)
                    .map(|p| p.name.clone())
                    .collect();
                if flagged.is_empty() {
                    vec![DEFAULT_ID_PROPERTY.to_owned()]
                } else {
                    flagged
                }
            }
        };

        let mut id_positions = Vec::with_capacity(id_names.len());
        for name in &id_names {
            let pos = position(name).ok_or_else(|| {
                DalError::Schema(format!("{entity} identity names undeclared property `{name}`"))
            })?;
            if properties.get(pos).is_some_and(|p| p.storage.is_counter()) {
                return Err(DalError::Schema(format!(
                    "{entity} identity cannot include counter `{name}`"
                )));
            }
            if id_positions.contains(&pos) {
                return Err(DalError::Schema(format!(
                    "{entity} identity lists `{name}` twice"
                )));
            }
            id_positions.push(pos);
        }

        let auto_increment = match self.auto_increment {
            Some(name) => {
                let pos = position(&name).ok_or_else(|| {
                    DalError::Schema(format!(
                        "{entity} auto-increment names undeclared property `{name}`"
                    ))
                })?;
                if properties.get(pos).is_some_and(|p| p.storage.is_counter()) {
                    return Err(DalError::Schema(format!(
                        "{entity} auto-increment cannot be counter `{name}`"
                    )));
                }
                Some(pos)
            }
            None => None,
        };

        let table = self.table.unwrap_or_else(|| entity.to_lowercase());
        let store_name = self
            .store_name
            .unwrap_or_else(|| DEFAULT_STORE_NAME.to_owned());

        Ok(Arc::new(Schema {
            entity,
            table,
            store_name,
            properties,
            id_positions,
            auto_increment,
        }))
    }
}
