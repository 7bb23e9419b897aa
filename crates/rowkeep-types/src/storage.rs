//! Storage type tags and value coercion.
//!
//! Stores hand back loosely typed data: drivers return integers as text,
//! booleans as `0`/`1`, floats as doubles. A property's [`StorageType`]
//! coerces that raw data into the declared shape on hydration and normalises
//! values on the way out.
//!
//! Coercion is lenient. Input that cannot be converted is kept unchanged
//! rather than rejected, and `Null` stays `Null` for every tag except
//! [`StorageType::Counter`].

use serde::{Deserialize, Serialize};

use crate::counter::Counter;
use crate::value::Value;

/// Declared storage type of an entity property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// 32-bit integer column.
    Integer,
    /// 64-bit integer column.
    BigInteger,
    /// Double precision floating point column.
    Double,
    /// Single precision floating point column.
    Float,
    /// Boolean column.
    Boolean,
    /// Text column.
    String,
    /// Untyped: values pass through unchanged.
    #[default]
    Opaque,
    /// Counter column, written only through deltas.
    Counter,
}

impl StorageType {
    /// Whether this tag marks a counter column.
    pub const fn is_counter(self) -> bool {
        matches!(self, Self::Counter)
    }

    /// Coerce raw store data into the declared type.
    ///
    /// Idempotent: coercing an already coerced value returns it unchanged.
    pub fn deserialize(self, value: Value) -> Value {
        match self {
            Self::Integer | Self::BigInteger => to_int(value),
            Self::Double => to_double(value),
            Self::Float => to_float(value),
            Self::Boolean => to_bool(value),
            Self::String => to_text(value),
            Self::Opaque => value,
            Self::Counter => to_counter(value),
        }
    }

    /// Produce the representation written to a store.
    ///
    /// Counters serialize to their calculated value; everything else is
    /// normalised exactly as [`deserialize`](Self::deserialize) would, so
    /// `serialize(deserialize(x)) == serialize(x)` holds for every tag.
    pub fn serialize(self, value: &Value) -> Value {
        match self.deserialize(value.clone()) {
            Value::Counter(counter) => Value::Int(counter.calculated()),
            other => other,
        }
    }
}

/// Convert a float to an integer when it holds a whole number in range.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn whole_number(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn to_int(value: Value) -> Value {
    match value {
        Value::Bool(b) => Value::Int(i64::from(b)),
        Value::Float(f) => whole_number(f).map_or(Value::Float(f), Value::Int),
        Value::Text(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(whole_number))
                .map_or(Value::Text(s), Value::Int)
        }
        Value::Counter(c) => Value::Int(c.calculated()),
        other => other,
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_double(value: Value) -> Value {
    match value {
        Value::Int(i) => Value::Float(i as f64),
        Value::Bool(b) => Value::Float(if b { 1.0 } else { 0.0 }),
        Value::Text(s) => s.trim().parse::<f64>().map_or(Value::Text(s), Value::Float),
        Value::Counter(c) => Value::Float(c.calculated() as f64),
        other => other,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_float(value: Value) -> Value {
    match to_double(value) {
        Value::Float(f) => Value::Float(f64::from(f as f32)),
        other => other,
    }
}

fn to_bool(value: Value) -> Value {
    match value {
        Value::Int(i) => Value::Bool(i != 0),
        Value::Float(f) => Value::Bool(f != 0.0),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" | "t" | "y" => Value::Bool(true),
            "0" | "false" | "no" | "off" | "f" | "n" | "" => Value::Bool(false),
            _ => Value::Text(s),
        },
        Value::Counter(c) => Value::Bool(c.calculated() != 0),
        other => other,
    }
}

fn to_text(value: Value) -> Value {
    match value {
        Value::Null | Value::Text(_) => value,
        Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => Value::Text(s),
            Err(e) => Value::Bytes(e.into_bytes()),
        },
        other => Value::Text(other.to_string()),
    }
}

fn to_counter(value: Value) -> Value {
    match value {
        Value::Counter(_) => value,
        other => Value::Counter(Counter::from_stored(counter_total(&other).unwrap_or(0))),
    }
}

/// Stored counter total read from raw store data.
///
/// Integers and integral text are taken as is, fractional numbers are
/// truncated toward zero and `Null` is zero. Returns `None` for data with
/// no numeric reading, which a counter property treats as a fresh counter.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn counter_total(value: &Value) -> Option<i64> {
    match value {
        Value::Null => Some(0),
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Counter(c) => Some(c.stored()),
        Value::Float(f) => {
            let truncated = f.trunc();
            (truncated.is_finite()
                && truncated >= i64::MIN as f64
                && truncated < i64::MAX as f64)
                .then_some(truncated as i64)
        }
        Value::Text(s) => {
            let trimmed = s.trim();
            trimmed.parse::<i64>().ok().or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(|f| counter_total(&Value::Float(f)))
            })
        }
        Value::Bytes(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| counter_total(&Value::Text(s.to_owned()))),
    }
}
