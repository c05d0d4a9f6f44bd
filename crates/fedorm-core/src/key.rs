//! Correlation keys.
//!
//! A [`KeyValue`] is the hashable, totally ordered form of a [`Value`] used to
//! match rows coming from different adapters. Integer widths collapse into one
//! variant; values without a natural scalar identity are stringified.

use crate::value::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Bool(bool),
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid([u8; 16]),
    /// Stringified form of a float, decimal, temporal, JSON or array value.
    Repr(String),
}

impl KeyValue {
    /// Derive a key from a value. Empty keys (NULL, `""`) yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        if value.is_empty_key() {
            return None;
        }
        Some(match value {
            Value::Bool(b) => KeyValue::Bool(*b),
            Value::TinyInt(_) | Value::SmallInt(_) | Value::Int(_) | Value::BigInt(_) => {
                KeyValue::Int(value.as_i64()?)
            }
            Value::Text(s) => KeyValue::Text(s.clone()),
            Value::Bytes(b) => KeyValue::Bytes(b.clone()),
            Value::Uuid(u) => KeyValue::Uuid(*u),
            other => KeyValue::Repr(other.to_json().to_string()),
        })
    }

    /// Turn the key back into a value suitable for an `IN` filter.
    ///
    /// Stringified keys come back as text; adapters comparing them against
    /// their native type must accept that.
    pub fn to_value(&self) -> Value {
        match self {
            KeyValue::Bool(b) => Value::Bool(*b),
            KeyValue::Int(i) => Value::BigInt(*i),
            KeyValue::Text(s) | KeyValue::Repr(s) => Value::Text(s.clone()),
            KeyValue::Bytes(b) => Value::Bytes(b.clone()),
            KeyValue::Uuid(u) => Value::Uuid(*u),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Bool(b) => write!(f, "{}", b),
            KeyValue::Int(i) => write!(f, "{}", i),
            KeyValue::Text(s) | KeyValue::Repr(s) => write!(f, "{}", s),
            KeyValue::Bytes(b) => write!(f, "0x{}", hex(b)),
            KeyValue::Uuid(u) => write!(f, "{}", hex(u)),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Int(v)
    }
}

impl From<i32> for KeyValue {
    fn from(v: i32) -> Self {
        KeyValue::Int(i64::from(v))
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Text(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        KeyValue::Text(v)
    }
}

/// Deduplicate values into keys, dropping empty ones, preserving first-seen order.
pub fn distinct_keys<'a, I>(values: I) -> Vec<KeyValue>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut seen = std::collections::HashSet::new();
    let mut keys = Vec::new();
    for value in values {
        if let Some(key) = value.to_key() {
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
    }
    keys
}

/// Like [`distinct_keys`], but keeps the first-seen original value for each key.
///
/// Filters built from these compare against adapter data in its native type,
/// which matters for keys that only exist in stringified form.
pub fn distinct_values<'a, I>(values: I) -> Vec<Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|value| value.to_key().is_some_and(|key| seen.insert(key)))
        .cloned()
        .collect()
}
