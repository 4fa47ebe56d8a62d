use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod document;

pub use document::{DocField, DocStatus, Document};

/// Host-managed fields that identify a line and tie it to its parent. They
/// are never copied into a synthesized line; the host assigns fresh values
/// after it replaces a collection.
pub const BOOKKEEPING_FIELDS: [&str; 6] = [
    "name",
    "owner",
    "parent",
    "parenttype",
    "parentfield",
    "idx",
];

/// Represents a scalar value stored in one field of a line.
///
/// Numbers keep the JSON form they were read with, so an integer `idx` or
/// `qty` is written back as an integer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Explicit JSON `null`.
    Null,
    /// Boolean flag, e.g. a check field.
    Boolean(bool),
    /// Integer or floating point number.
    Number(serde_json::Number),
    /// Plain string.
    String(String),
}

/// Largest magnitude below which every integral `f64` is exact.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

impl FieldValue {
    /// Builds a numeric value from a computed result. Integral results are
    /// stored as integers; NaN and infinities become `null`.
    pub fn number(value: f64) -> Self {
        if value.fract() == 0.0 && value.abs() < MAX_EXACT_INTEGER {
            return FieldValue::Number((value as i64).into());
        }
        serde_json::Number::from_f64(value)
            .map(FieldValue::Number)
            .unwrap_or(FieldValue::Null)
    }

    /// Returns the numeric payload, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(number) => number.as_f64(),
            _ => None,
        }
    }

    /// Returns `true` for `null` and the empty string, the two values the
    /// host treats as "not filled in".
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::String(value) => value.is_empty(),
            _ => false,
        }
    }
}

/// Renders the value the way it takes part in a group key: numbers without a
/// trailing `.0`, booleans as `true`/`false`, `null` as nothing.
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Boolean(value) => write!(f, "{value}"),
            FieldValue::Number(value) if value.is_f64() => {
                write!(f, "{}", value.as_f64().unwrap_or_default())
            }
            FieldValue::Number(value) => write!(f, "{value}"),
            FieldValue::String(value) => f.write_str(value),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value.into())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

/// One row of a child collection: an open mapping from field name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Line {
    fields: BTreeMap<String, FieldValue>,
}

impl Line {
    /// Returns the value stored under `field`, if any.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Inserts or replaces a field value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Iterates over the fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copies every field except the host bookkeeping fields.
    pub fn without_bookkeeping(&self) -> Line {
        let fields = self
            .fields
            .iter()
            .filter(|(name, _)| !BOOKKEEPING_FIELDS.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Line { fields }
    }
}

impl<K, V> FromIterator<(K, V)> for Line
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let fields = iter
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        Line { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integers_survive_a_json_round_trip() {
        let source = json!({"idx": 1, "qty": 2, "rate": 12.5, "stock_qty": 2.0});
        let line: Line = serde_json::from_value(source.clone()).expect("line parsed");

        let written = serde_json::to_string(&line).expect("line serialized");

        assert_eq!(written, r#"{"idx":1,"qty":2,"rate":12.5,"stock_qty":2.0}"#);
    }

    #[test]
    fn computed_numbers_keep_integral_results_integral() {
        assert_eq!(FieldValue::number(5.0), FieldValue::Number(5.into()));
        assert_eq!(FieldValue::number(-3.0), FieldValue::Number((-3).into()));
        assert_eq!(FieldValue::number(2.5).to_string(), "2.5");
        assert_eq!(FieldValue::number(f64::NAN), FieldValue::Null);
    }

    #[test]
    fn float_and_integer_forms_render_alike() {
        let float: FieldValue = serde_json::from_value(json!(2400.0)).expect("float parsed");
        let integer: FieldValue = serde_json::from_value(json!(2400)).expect("integer parsed");

        assert_eq!(float.to_string(), "2400");
        assert_eq!(integer.to_string(), "2400");
    }
}
