//! Runtime value representation for instances and contract predicates

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::errors::{ContractError, ContractResult};

/// Runtime value types
///
/// The `Map` variant doubles as the old-state snapshot representation:
/// a mapping from field name to the field's pre-call value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Integer value
    Int(i64),

    /// Floating point value
    Float(f64),

    /// Boolean value
    Bool(bool),

    /// Text value
    Text(String),

    /// List of values
    List(Vec<Value>),

    /// Key-value mapping (also used for old-state snapshots)
    Map(FxHashMap<String, Value>),

    /// Nil/absent value
    Nil,
}

impl Value {
    /// Interpret this value as an integer
    pub fn as_int(&self) -> ContractResult<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(ContractError::Evaluation(format!(
                "expected integer value, got {:?}",
                other
            ))),
        }
    }

    /// Interpret this value as a float, widening integers
    pub fn as_float(&self) -> ContractResult<f64> {
        match self {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            other => Err(ContractError::Evaluation(format!(
                "expected numeric value, got {:?}",
                other
            ))),
        }
    }

    /// Interpret this value as a boolean
    pub fn as_bool(&self) -> ContractResult<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(ContractError::Evaluation(format!(
                "expected boolean value, got {:?}",
                other
            ))),
        }
    }

    /// Interpret this value as text
    pub fn as_text(&self) -> ContractResult<&str> {
        match self {
            Value::Text(s) => Ok(s),
            other => Err(ContractError::Evaluation(format!(
                "expected text value, got {:?}",
                other
            ))),
        }
    }

    /// Look up an entry of a `Map` value
    pub fn map_get(&self, key: &str) -> ContractResult<Value> {
        match self {
            Value::Map(entries) => entries.get(key).cloned().ok_or_else(|| {
                ContractError::Evaluation(format!("no entry '{}' in map value", key))
            }),
            other => Err(ContractError::Evaluation(format!(
                "expected map value, got {:?}",
                other
            ))),
        }
    }

    /// Whether this value is nil
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}
