//! Render-context value semantics.
//!
//! The render context is arbitrary key/value data, so values are
//! `serde_json::Value`. Template expressions evaluate with the source
//! system's coercion rules, which this module centralizes: truthiness,
//! display formatting, and the hashable key form used for component slots.

use std::fmt;

pub use serde_json::{json, Map, Number, Value};

/// Check whether a value is nullish (null / absent).
pub fn is_nullish(value: &Value) -> bool {
    value.is_null()
}

/// Truthiness: null, false, 0, NaN and "" are falsy; everything else,
/// including empty arrays and objects, is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Content test for text emission: truthy, or the number zero.
///
/// A bare `0` still renders as text even though it is falsy.
pub fn is_content(value: &Value) -> bool {
    if let Value::Number(n) = value {
        if n.as_f64() == Some(0.0) {
            return true;
        }
    }
    is_truthy(value)
}

/// Format a value the way text interpolation displays it.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Format a number without a trailing `.0` for integral values.
fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(f) = n.as_f64() {
        if f.fract() == 0.0 && f.abs() < 1e15 {
            return format!("{}", f as i64);
        }
        return f.to_string();
    }
    n.to_string()
}

/// A value reduced to a hashable key, used for component slot identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue {
    /// A string key.
    Str(String),
    /// An integral key.
    Int(i64),
    /// A non-integral numeric key, held by bit pattern.
    Bits(u64),
    /// A boolean key.
    Bool(bool),
    /// A null key.
    Null,
}

impl KeyValue {
    /// Derive a key from an evaluated expression value. Arrays and objects
    /// fall back to their JSON rendering.
    pub fn from_value(value: &Value) -> KeyValue {
        match value {
            Value::Null => KeyValue::Null,
            Value::Bool(b) => KeyValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => KeyValue::Int(i),
                None => {
                    let f = n.as_f64().unwrap_or(f64::NAN);
                    // Integral floats collapse onto the integer key so 7
                    // and 7.0 identify the same slot.
                    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                        KeyValue::Int(f as i64)
                    } else {
                        KeyValue::Bits(f.to_bits())
                    }
                }
            },
            Value::String(s) => KeyValue::Str(s.clone()),
            Value::Array(_) | Value::Object(_) => KeyValue::Str(value.to_string()),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Str(s) => write!(f, "{}", s),
            KeyValue::Int(i) => write!(f, "{}", i),
            KeyValue::Bits(b) => write!(f, "{}", f64::from_bits(*b)),
            KeyValue::Bool(b) => write!(f, "{}", b),
            KeyValue::Null => write!(f, "null"),
        }
    }
}
