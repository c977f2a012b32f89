//! Scalar cell values and column/value pairs.
//!
//! [`Value`] is the leaf scalar stored in row cells and carried by
//! ephemeral entries. On the wire it is adjacently tagged so browser
//! clients can switch on `tag` without guessing number kinds:
//!
//! ```json
//! {"tag": "val-int", "val": 30}
//! {"tag": "val-null"}
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A scalar cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "tag", content = "val")]
#[ts(export, export_to = "bindings/")]
pub enum Value {
    /// Explicit null.
    #[serde(rename = "val-null")]
    Null,
    /// Boolean.
    #[serde(rename = "val-bool")]
    Bool(bool),
    /// Signed 32-bit integer.
    #[serde(rename = "val-int")]
    Int(i32),
    /// 64-bit float.
    #[serde(rename = "val-float")]
    Float(f64),
    /// UTF-8 string.
    #[serde(rename = "val-str")]
    Str(String),
}

impl Value {
    /// Whether this value is [`Value::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Compare two values for state-change detection.
    ///
    /// Floats compare by bit pattern so that `NaN` replacing `NaN` is not
    /// reported as a change and `0.0` vs `-0.0` is.
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// A column name paired with its value, used by row inserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct KeyValue {
    /// Column name.
    pub key: String,
    /// Cell value.
    pub val: Value,
}

impl KeyValue {
    /// Build a pair from anything convertible into a [`Value`].
    pub fn new(key: impl Into<String>, val: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            val: val.into(),
        }
    }
}
