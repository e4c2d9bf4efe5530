//! Scalar values and records.
//!
//! A [`Record`] is an open mapping from field name to [`Value`]. Raw caller
//! input, transformer output and predictor output all use this shape, so it
//! serializes to and from a flat JSON object.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One row of tabular data keyed by field name.
pub type Record = BTreeMap<String, Value>;

/// A scalar cell value.
///
/// Untagged on the wire: JSON `null`, booleans, integers, floats and strings
/// map onto the variants in that order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Explicit missing value. Treated the same as an absent field.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Numeric view of the value.
    ///
    /// Integers and floats convert directly, booleans become `0.0`/`1.0`.
    /// Text and null have no numeric view.
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Null | Value::Text(_) => None,
        }
    }

    /// Returns the string payload for text values.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Key used to look the value up in a categorical vocabulary.
    ///
    /// Floats only produce a key when they hold an integral value inside
    /// the `i64` range, so `1.0` and `1` hit the same vocabulary entry.
    pub fn category_key(&self) -> Option<String> {
        // 2^63
        const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;
        match self {
            Value::Text(s) => Some(s.clone()),
            Value::Int(v) => Some(v.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Float(v) if v.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(v) => {
                Some((*v as i64).to_string())
            }
            Value::Float(_) | Value::Null => None,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Build a [`Record`] from `(name, value)` pairs.
///
/// ```
/// use modelpack::value::{record, Value};
///
/// let r = record([("a", Value::from(5)), ("b", Value::from("x"))]);
/// assert_eq!(r["a"], Value::Int(5));
/// ```
pub fn record<K, I>(pairs: I) -> Record
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_keys_of_floats() {
        assert_eq!(Value::Float(1.0).category_key().as_deref(), Some("1"));
        assert_eq!(Value::Float(-3.0).category_key().as_deref(), Some("-3"));
        assert_eq!(Value::Float(1.5).category_key(), None);
        assert_eq!(Value::Float(f64::NAN).category_key(), None);
        assert_eq!(Value::Float(f64::INFINITY).category_key(), None);
        assert_eq!(
            Value::Float(-9_223_372_036_854_775_808.0).category_key(),
            Some(i64::MIN.to_string())
        );
        // no saturation onto i64::MAX
        assert_eq!(Value::Float(9_223_372_036_854_775_808.0).category_key(), None);
        assert_eq!(Value::Float(1e300).category_key(), None);
    }

    #[test]
    fn numeric_views() {
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::Float(2.5).as_f64(), Some(2.5));
        assert_eq!(Value::Bool(true).as_f64(), Some(1.0));
        assert_eq!(Value::Text("3".into()).as_f64(), None);
        assert_eq!(Value::Null.as_f64(), None);
    }

    #[test]
    fn category_keys_unify_integral_numbers() {
        assert_eq!(Value::Int(1).category_key(), Value::Float(1.0).category_key());
        assert_eq!(Value::Float(1.5).category_key(), None);
        assert_eq!(Value::from("M").category_key().as_deref(), Some("M"));
    }

    #[test]
    fn untagged_json() {
        let r: Record =
            serde_json::from_str(r#"{"a": 5, "b": 2.5, "c": "M", "d": null, "e": true}"#).unwrap();
        assert_eq!(r["a"], Value::Int(5));
        assert_eq!(r["b"], Value::Float(2.5));
        assert_eq!(r["c"], Value::Text("M".into()));
        assert_eq!(r["d"], Value::Null);
        assert_eq!(r["e"], Value::Bool(true));

        let json = serde_json::to_string(&r).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
