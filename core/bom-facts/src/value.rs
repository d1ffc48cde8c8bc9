//! FILENAME: core/bom-facts/src/value.rs
//! PURPOSE: Defines the scalar stored under each field of a fact record.
//! CONTEXT: Fact tables arrive from the loader as flat JSON-like records, so a
//! value is either a number, a piece of text, a boolean or nothing at all.
//! Dimension columns hold foreign keys (usually text), measure columns hold
//! numbers, but neither is guaranteed by the source.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar inside a fact record.
///
/// Deserializes untagged so `{"LE": "US", "COST": 10}` maps directly onto
/// `Text("US")` and `Number(10.0)`; `null` becomes `Empty`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Number(f64),
    Boolean(bool),
    Text(String),
    Empty,
}

impl FactValue {
    /// Returns the number if this is a numeric value.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FactValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the text if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FactValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, FactValue::Empty)
    }

    /// Returns the value as the string used to join against dimension keys.
    ///
    /// Text is borrowed as-is. Whole numbers drop their fractional part so a
    /// numeric foreign key `1001.0` joins with a dimension key `"1001"`.
    pub fn as_key(&self) -> Cow<'_, str> {
        match self {
            FactValue::Text(s) => Cow::Borrowed(s.as_str()),
            FactValue::Number(n) => Cow::Owned(format_number(*n)),
            FactValue::Boolean(b) => Cow::Borrowed(if *b { "TRUE" } else { "FALSE" }),
            FactValue::Empty => Cow::Borrowed(""),
        }
    }
}

/// Format without unnecessary decimal places.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

impl Default for FactValue {
    fn default() -> Self {
        FactValue::Empty
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}

impl From<f64> for FactValue {
    fn from(value: f64) -> Self {
        FactValue::Number(value)
    }
}

impl From<i64> for FactValue {
    fn from(value: i64) -> Self {
        FactValue::Number(value as f64)
    }
}

impl From<i32> for FactValue {
    fn from(value: i32) -> Self {
        FactValue::Number(value as f64)
    }
}

impl From<bool> for FactValue {
    fn from(value: bool) -> Self {
        FactValue::Boolean(value)
    }
}

impl From<&str> for FactValue {
    fn from(value: &str) -> Self {
        FactValue::Text(value.to_string())
    }
}

impl From<String> for FactValue {
    fn from(value: String) -> Self {
        FactValue::Text(value)
    }
}

impl<T: Into<FactValue>> From<Option<T>> for FactValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FactValue::Empty)
    }
}
