//! Property change sets.

use rowkeep_types::Value;

/// One property whose current value differs from its last checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    /// Property name.
    pub property: String,
    /// Value at the last save or load.
    pub from: Value,
    /// Current value.
    pub to: Value,
}

/// Changed properties of an entity, in declaration order.
///
/// Built by comparing every current value against its checkpoint, so a
/// property written back to its original value never appears here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<PropertyChange>,
}

impl ChangeSet {
    pub(crate) const fn new(changes: Vec<PropertyChange>) -> Self {
        Self { changes }
    }

    /// Whether nothing changed.
    pub const fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changed properties.
    pub const fn len(&self) -> usize {
        self.changes.len()
    }

    /// Change entry for `property`, if it changed.
    pub fn get(&self, property: &str) -> Option<&PropertyChange> {
        self.changes.iter().find(|c| c.property == property)
    }

    /// Whether `property` changed.
    pub fn contains(&self, property: &str) -> bool {
        self.get(property).is_some()
    }

    /// Names of the changed properties.
    pub fn properties(&self) -> Vec<&str> {
        self.changes.iter().map(|c| c.property.as_str()).collect()
    }

    /// Iterate over the changes.
    pub fn iter(&self) -> std::slice::Iter<'_, PropertyChange> {
        self.changes.iter()
    }
}

impl IntoIterator for ChangeSet {
    type Item = PropertyChange;
    type IntoIter = std::vec::IntoIter<PropertyChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a PropertyChange;
    type IntoIter = std::slice::Iter<'a, PropertyChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}
