//! Decoded field values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A basic action as stored in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BasicAction {
    /// Action type.
    pub action_type: u8,
    /// Action.
    pub action: u8,
    /// Target device.
    pub device_nr: u16,
    /// Extra parameter.
    pub extra_parameter: u16,
}

impl BasicAction {
    /// The unprogrammed action, all bits set.
    pub const EMPTY: BasicAction = BasicAction {
        action_type: 255,
        action: 255,
        device_nr: 65535,
        extra_parameter: 65535,
    };

    /// Check if the action is unprogrammed.
    pub fn is_empty(&self) -> bool {
        *self == BasicAction::EMPTY
    }
}

impl fmt::Display for BasicAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.action_type, self.action, self.device_nr, self.extra_parameter
        )
    }
}

/// The value of one field or composite member.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// No value stored (for example an unset temperature).
    Empty,
    /// Integer.
    Int(i64),
    /// Boolean.
    Bool(bool),
    /// Floating point number.
    Float(f64),
    /// Text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Enum entry name.
    Enum(String),
    /// Basic action.
    BasicAction(BasicAction),
    /// Composite members by name.
    Composite(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// Name of the variant, used in error messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Empty => "empty",
            FieldValue::Int(_) => "integer",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "text",
            FieldValue::Bytes(_) => "bytes",
            FieldValue::Enum(_) => "enum",
            FieldValue::BasicAction(_) => "basic action",
            FieldValue::Composite(_) => "composite",
        }
    }

    /// Check if nothing is stored.
    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Empty)
    }

    /// Integer value, when the value is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value, integers included.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Text or enum name.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) | FieldValue::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// Composite member.
    pub fn member(&self, name: &str) -> Option<&FieldValue> {
        match self {
            FieldValue::Composite(members) => members.get(name),
            _ => None,
        }
    }

    pub(crate) fn expect_int(&self, expected: &'static str) -> Result<i64, ValidationError> {
        match self {
            FieldValue::Int(v) => Ok(*v),
            other => Err(ValidationError::WrongType {
                expected,
                actual: other.type_name(),
            }),
        }
    }

    pub(crate) fn expect_str(&self, expected: &'static str) -> Result<&str, ValidationError> {
        match self {
            FieldValue::Text(s) => Ok(s),
            other => Err(ValidationError::WrongType {
                expected,
                actual: other.type_name(),
            }),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Empty => Ok(()),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(s) | FieldValue::Enum(s) => f.write_str(s),
            FieldValue::Bytes(bytes) => {
                let parts: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
                f.write_str(&parts.join(","))
            }
            FieldValue::BasicAction(action) => write!(f, "{}", action),
            FieldValue::Composite(members) => {
                let parts: Vec<String> = members.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u8> for FieldValue {
    fn from(v: u8) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<u16> for FieldValue {
    fn from(v: u16) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<BasicAction> for FieldValue {
    fn from(v: BasicAction) -> Self {
        FieldValue::BasicAction(v)
    }
}
