// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Untyped document fields.
//!
//! Replicated documents have no schema, so fields are held as a generic
//! tagged [`Value`]. On the wire (and in every backend) a document is plain
//! JSON; `Value` is `serde(untagged)` so it round-trips without wrappers.
//! Integers above `i64::MAX` land in [`Value::Unsigned`] rather than being
//! widened to a float.
//!
//! # Merge Semantics
//!
//! [`merge_fields`] implements the merge write used by every store:
//!
//! ```text
//! existing  {a: 1, m: {x: 1, y: 2}}
//! incoming  {b: 2, m: {y: 9}}
//! result    {a: 1, b: 2, m: {x: 1, y: 9}}
//! ```
//!
//! Nested maps merge recursively; anything else is replaced wholesale.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The fields of one document.
pub type Fields = BTreeMap<String, Value>;

/// A schema-less document value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    /// Only holds values above `i64::MAX`; anything smaller is `Integer`.
    Unsigned(u64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Map(Fields),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Loose truth test for flags written by other tools: null, `false`,
    /// zero and empty strings, arrays and maps are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Unsigned(u) => *u != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    /// Short type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) | Value::Unsigned(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(Value::Unsigned(v), Value::Integer)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Fields> for Value {
    fn from(v: Fields) -> Self {
        Value::Map(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

/// Merge `incoming` into `target` (merge-write semantics, see module docs).
pub fn merge_fields(target: &mut Fields, incoming: Fields) {
    for (key, value) in incoming {
        match (target.get_mut(&key), value) {
            (Some(Value::Map(existing)), Value::Map(nested)) => merge_fields(existing, nested),
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// Build a single-field update `{key: {field: value}}`.
///
/// Used for in-place updates of one entry inside a map-of-maps document
/// (e.g. flipping `processed` on one log entry).
pub fn nested_update(key: &str, field: &str, value: Value) -> Fields {
    let mut inner = Fields::new();
    inner.insert(field.to_string(), value);
    let mut outer = Fields::new();
    outer.insert(key.to_string(), Value::Map(inner));
    outer
}
