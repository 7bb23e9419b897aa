//! Entity identity values.

use std::fmt;

use rowkeep_types::Value;

/// The identity of an entity, derived from its id properties.
///
/// A single id property yields [`Identity::Single`] unless a composite
/// form is forced; several id properties always yield
/// [`Identity::Composite`] in identity order.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    /// Bare value of the only id property.
    Single(Value),
    /// Ordered `(property, value)` pairs.
    Composite(Vec<(String, Value)>),
}

impl Identity {
    /// Identity made of one bare value.
    pub fn single(value: impl Into<Value>) -> Self {
        Self::Single(value.into())
    }

    /// Identity made of named values, kept in the given order.
    pub fn composite<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Composite(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// The bare value of a single identity.
    pub const fn as_single(&self) -> Option<&Value> {
        match self {
            Self::Single(value) => Some(value),
            Self::Composite(_) => None,
        }
    }

    /// Value of `property` in a composite identity.
    pub fn get(&self, property: &str) -> Option<&Value> {
        match self {
            Self::Single(_) => None,
            Self::Composite(pairs) => pairs
                .iter()
                .find(|(name, _)| name == property)
                .map(|(_, value)| value),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(value) => write!(f, "{value}"),
            Self::Composite(pairs) => {
                for (i, (name, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}={value}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<Value> for Identity {
    fn from(value: Value) -> Self {
        Self::Single(value)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::Single(Value::from(value))
    }
}

impl From<i64> for Identity {
    fn from(value: i64) -> Self {
        Self::Single(Value::Int(value))
    }
}

impl From<i32> for Identity {
    fn from(value: i32) -> Self {
        Self::Single(Value::Int(i64::from(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_keeps_order_and_renders() {
        let id = Identity::composite([("status", "disabled"), ("email", "a@x.com")]);
        assert_eq!(id.to_string(), "status=disabled, email=a@x.com");
        assert_eq!(id.get("email"), Some(&Value::from("a@x.com")));
        assert_eq!(id.as_single(), None);
    }

    #[test]
    fn single_renders_bare_value() {
        let id = Identity::from("a@x.com");
        assert_eq!(id.to_string(), "a@x.com");
        assert_eq!(id.as_single(), Some(&Value::from("a@x.com")));
    }
}
