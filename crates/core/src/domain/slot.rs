use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered slot name → value mapping carried by a conversation.
pub type SlotMap = BTreeMap<String, SlotValue>;

/// A single slot value.
///
/// Values extracted by the language model arrive as arbitrary JSON. Scalars map
/// onto their variant; arrays and objects are kept as their JSON text so slot
/// handling never has to reason about nested structures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl SlotValue {
    /// `true` when the value does not count as provided: null or the empty string.
    pub fn is_unset(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(value) => value.is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Render the value as plain text for lookups keyed by string.
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(value) => value.to_string(),
            Self::Number(value) => value.to_string(),
            Self::String(value) => value.clone(),
        }
    }
}

impl fmt::Display for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(value) => write!(f, "{value:?}"),
            other => f.write_str(&other.to_text()),
        }
    }
}

impl From<Value> for SlotValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(value) => Self::Bool(value),
            Value::Number(value) => Self::Number(value),
            Value::String(value) => Self::String(value),
            nested @ (Value::Array(_) | Value::Object(_)) => Self::String(nested.to_string()),
        }
    }
}

impl From<&str> for SlotValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for SlotValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<SlotValue> for Value {
    fn from(value: SlotValue) -> Self {
        match value {
            SlotValue::Null => Value::Null,
            SlotValue::Bool(value) => Value::Bool(value),
            SlotValue::Number(value) => Value::Number(value),
            SlotValue::String(value) => Value::String(value),
        }
    }
}
