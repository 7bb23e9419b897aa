//! Dynamically typed property values.
//!
//! Entities are described by a runtime schema rather than by Rust struct
//! fields, so every property value travels as a [`Value`]. Rows read from a
//! store are plain [`Row`] maps of column name to value.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, Serializer};

use crate::counter::Counter;

/// A raw record read from, or written to, a store: column name to value.
pub type Row = BTreeMap<String, Value>;

/// A single property or column value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// Absent value (`NULL`).
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer (covers `int` and `bigint` columns).
    Int(i64),
    /// Floating point (covers `float` and `double` columns).
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Opaque binary data.
    Bytes(Vec<u8>),
    /// Delta-buffered counter.
    Counter(Counter),
}

impl Value {
    /// Whether this value is [`Value::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short lowercase name of the variant, used in error messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Counter(_) => "counter",
        }
    }

    /// Integer view of the value, if it holds one.
    ///
    /// Counters report their calculated value.
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Counter(c) => Some(c.calculated()),
            _ => None,
        }
    }

    /// Floating point view of the value, if it is numeric.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            Self::Counter(c) => Some(c.calculated() as f64),
            _ => None,
        }
    }

    /// Boolean view of the value, if it holds one.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// String view of the value, if it holds text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Counter view of the value, if it holds one.
    pub const fn as_counter(&self) -> Option<&Counter> {
        match self {
            Self::Counter(c) => Some(c),
            _ => None,
        }
    }

    /// Mutable counter view of the value, if it holds one.
    pub const fn as_counter_mut(&mut self) -> Option<&mut Counter> {
        match self {
            Self::Counter(c) => Some(c),
            _ => None,
        }
    }

    /// Order two values for predicate evaluation.
    ///
    /// Integers and floats compare numerically with each other. Values of
    /// unrelated types, and any comparison involving `Null`, are unordered.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    /// Project the value onto JSON.
    ///
    /// Counters become their calculated value, bytes become an array of
    /// numbers, and non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Bytes(b) => serde_json::Value::from(b.clone()),
            Self::Counter(c) => serde_json::Value::from(c.calculated()),
        }
    }

    /// Build a value from JSON.
    ///
    /// Whole numbers that fit in `i64` become [`Value::Int`], other numbers
    /// become [`Value::Float`]. Arrays of bytes become [`Value::Bytes`]; any
    /// other array or object is kept as its JSON text.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| n.as_f64().map_or(Self::Null, Self::Float), Self::Int),
            serde_json::Value::String(s) => Self::Text(s.clone()),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
                .collect::<Option<Vec<u8>>>()
                .map_or_else(|| Self::Text(json.to_string()), Self::Bytes),
            serde_json::Value::Object(_) => Self::Text(json.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
            Self::Bytes(bytes) => {
                f.write_str("0x")?;
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::Counter(c) => write!(f, "{}", c.calculated()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Bytes(b) => b.serialize(serializer),
            Self::Counter(c) => serializer.serialize_i64(c.calculated()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<Counter> for Value {
    fn from(value: Counter) -> Self {
        Self::Counter(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
