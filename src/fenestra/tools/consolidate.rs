//! Duplicate line-item consolidation.
//!
//! The engine is a pure function over a snapshot of a child collection: it
//! groups lines that agree on every configured key field, sums their
//! quantity, recomputes the derived (stock unit) quantity and returns the
//! replacement collection in first-occurrence order. Running it over its own
//! output is a no-op, which the host relies on when several lifecycle events
//! fire on the same document.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fenestra::tools::error::{Result, ToolError};
use crate::fenestra::tools::model::{FieldValue, Line};

/// Separator used when a group key is rendered as text.
pub const KEY_SEPARATOR: &str = "||";

/// Parameters describing how one child collection is consolidated.
///
/// A config always has at least one key field and a quantity field. The
/// quantity, derived and conversion factor fields are distinct and never part
/// of the key, otherwise a merge would change the key of its own output.
/// Both rules are checked when the value is built or deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawConsolidationConfig")]
pub struct ConsolidationConfig {
    key_fields: Vec<String>,
    quantity_field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    derived_quantity_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversion_factor_field: Option<String>,
}

impl ConsolidationConfig {
    /// Creates a config grouping on `key_fields` and summing `quantity_field`.
    pub fn new<I, S>(key_fields: I, quantity_field: impl Into<String>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key_fields: Vec<String> = key_fields.into_iter().map(Into::into).collect();
        let quantity_field = quantity_field.into();

        if key_fields.is_empty() {
            return Err(ToolError::InvalidConfig(
                "at least one key field is required".into(),
            ));
        }
        if let Some(blank) = key_fields.iter().position(|field| field.trim().is_empty()) {
            return Err(ToolError::InvalidConfig(format!(
                "key field at position {blank} is blank"
            )));
        }

        let config = Self {
            key_fields,
            quantity_field,
            derived_quantity_field: None,
            conversion_factor_field: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Recomputes `field` as `quantity * conversion factor` on merged lines.
    pub fn with_derived_quantity(mut self, field: impl Into<String>) -> Result<Self> {
        self.derived_quantity_field = Some(field.into());
        self.validate()?;
        Ok(self)
    }

    /// Reads the conversion factor for the derived quantity from `field`.
    pub fn with_conversion_factor(mut self, field: impl Into<String>) -> Result<Self> {
        self.conversion_factor_field = Some(field.into());
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        let mut written = vec![("quantity", self.quantity_field.as_str())];
        if let Some(field) = self.derived_quantity_field() {
            written.push(("derived quantity", field));
        }
        if let Some(field) = self.conversion_factor_field() {
            written.push(("conversion factor", field));
        }

        for (position, (role, field)) in written.iter().enumerate() {
            if field.trim().is_empty() {
                return Err(ToolError::InvalidConfig(format!("{role} field name is blank")));
            }
            if self.key_fields.iter().any(|key| key == field) {
                return Err(ToolError::InvalidConfig(format!(
                    "{role} field '{field}' is also a key field"
                )));
            }
            if let Some((other, _)) = written[..position].iter().find(|(_, seen)| seen == field) {
                return Err(ToolError::InvalidConfig(format!(
                    "{role} field '{field}' is already the {other} field"
                )));
            }
        }
        Ok(())
    }

    pub fn key_fields(&self) -> &[String] {
        &self.key_fields
    }

    pub fn quantity_field(&self) -> &str {
        &self.quantity_field
    }

    pub fn derived_quantity_field(&self) -> Option<&str> {
        self.derived_quantity_field.as_deref()
    }

    pub fn conversion_factor_field(&self) -> Option<&str> {
        self.conversion_factor_field.as_deref()
    }
}

#[derive(Deserialize)]
struct RawConsolidationConfig {
    key_fields: Vec<String>,
    quantity_field: String,
    #[serde(default)]
    derived_quantity_field: Option<String>,
    #[serde(default)]
    conversion_factor_field: Option<String>,
}

impl TryFrom<RawConsolidationConfig> for ConsolidationConfig {
    type Error = ToolError;

    fn try_from(raw: RawConsolidationConfig) -> Result<Self> {
        let mut config = ConsolidationConfig::new(raw.key_fields, raw.quantity_field)?;
        if let Some(field) = non_blank(raw.derived_quantity_field) {
            config = config.with_derived_quantity(field)?;
        }
        if let Some(field) = non_blank(raw.conversion_factor_field) {
            config = config.with_conversion_factor(field)?;
        }
        Ok(config)
    }
}

fn non_blank(field: Option<String>) -> Option<String> {
    field.filter(|name| !name.trim().is_empty())
}

/// Identifies the group a line belongs to: one segment per key field, in
/// key-field order. Missing and `null` values contribute an empty segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey(Vec<String>);

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(KEY_SEPARATOR))
    }
}

/// Builds the group key of `line` over the ordered `key_fields`.
pub fn build_key(line: &Line, key_fields: &[String]) -> GroupKey {
    let segments = key_fields
        .iter()
        .map(|field| line.get(field).map(FieldValue::to_string).unwrap_or_default())
        .collect();
    GroupKey(segments)
}

/// Loose numeric coercion for quantity-like fields.
///
/// Numbers are returned as is. Strings yield their leading numeric prefix
/// (`" 12.5 pcs"` is `12.5`). Everything else, including missing values,
/// blanks and unparsable text, counts as zero.
pub fn coerce_number(value: Option<&FieldValue>) -> f64 {
    match value {
        Some(FieldValue::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(FieldValue::String(text)) => parse_leading_number(text).unwrap_or(0.0),
        Some(FieldValue::Boolean(_)) | Some(FieldValue::Null) | None => 0.0,
    }
}

fn parse_leading_number(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut digits = end - int_start;

    if bytes.get(end) == Some(&b'.') {
        let mut frac_end = end + 1;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        digits += frac_end - end - 1;
        if digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }

    text[..end].parse().ok()
}

/// Outcome of a consolidation pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Consolidation {
    /// No two lines share a key; the caller keeps its collection as is.
    Unchanged,
    /// Replacement collection, one line per distinct key in first-occurrence
    /// order. The lines carry no bookkeeping fields.
    Consolidated(Vec<Line>),
}

impl Consolidation {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Consolidation::Unchanged)
    }

    /// Returns the merged lines, or `None` when nothing changed.
    pub fn into_lines(self) -> Option<Vec<Line>> {
        match self {
            Consolidation::Unchanged => None,
            Consolidation::Consolidated(lines) => Some(lines),
        }
    }

    /// Resolves the outcome against the collection it was computed from.
    pub fn apply(self, original: Vec<Line>) -> Vec<Line> {
        self.into_lines().unwrap_or(original)
    }
}

struct Group<'a> {
    template: &'a Line,
    quantity: f64,
    conversion_factor: Option<f64>,
}

/// Merges lines sharing a group key.
///
/// `lines` is the full ordered snapshot of the collection, already stripped of
/// empty entries by the caller.
pub fn consolidate(lines: &[Line], config: &ConsolidationConfig) -> Consolidation {
    if lines.is_empty() {
        return Consolidation::Unchanged;
    }

    let mut index: HashMap<GroupKey, usize> = HashMap::with_capacity(lines.len());
    let mut groups: Vec<Group<'_>> = Vec::new();

    for line in lines {
        let key = build_key(line, config.key_fields());
        let quantity = coerce_number(line.get(config.quantity_field()));

        match index.entry(key) {
            Entry::Occupied(entry) => {
                let group = &mut groups[*entry.get()];
                group.quantity += quantity;
                if group.conversion_factor.is_none() {
                    group.conversion_factor = conversion_factor_of(line, config);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(groups.len());
                groups.push(Group {
                    template: line,
                    quantity,
                    conversion_factor: conversion_factor_of(line, config),
                });
            }
        }
    }

    if groups.len() == lines.len() {
        debug!(line_count = lines.len(), "no duplicate lines found");
        return Consolidation::Unchanged;
    }

    debug!(
        line_count = lines.len(),
        group_count = groups.len(),
        "merging duplicate lines"
    );
    let merged = groups
        .into_iter()
        .map(|group| synthesize(group, config))
        .collect();
    Consolidation::Consolidated(merged)
}

/// The conversion factor a line supplies: a number, or text with a numeric
/// prefix. Missing, blank and non-numeric values supply none; zero counts.
fn conversion_factor_of(line: &Line, config: &ConsolidationConfig) -> Option<f64> {
    let field = config.conversion_factor_field()?;
    match line.get(field)? {
        FieldValue::Number(number) => number.as_f64(),
        FieldValue::String(text) => parse_leading_number(text),
        FieldValue::Boolean(_) | FieldValue::Null => None,
    }
}

/// Only the quantity and derived fields are written; every other field,
/// the conversion factor included, is the template's.
fn synthesize(group: Group<'_>, config: &ConsolidationConfig) -> Line {
    let mut line = group.template.without_bookkeeping();
    line.set(config.quantity_field(), group.quantity);

    if let Some(derived_field) = config.derived_quantity_field() {
        let factor = group.conversion_factor.unwrap_or(1.0);
        line.set(derived_field, group.quantity * factor);
    }

    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fenestra::tools::model::BOOKKEEPING_FIELDS;
    use serde_json::json;

    fn line(value: serde_json::Value) -> Line {
        serde_json::from_value(value).expect("line literal")
    }

    fn item_config() -> ConsolidationConfig {
        ConsolidationConfig::new(["item"], "qty").expect("valid config")
    }

    fn stock_config() -> ConsolidationConfig {
        ConsolidationConfig::new(["item", "unit"], "qty")
            .and_then(|config| config.with_derived_quantity("stock_qty"))
            .and_then(|config| config.with_conversion_factor("conversion_factor"))
            .expect("valid config")
    }

    #[test]
    fn merges_two_identical_lines() {
        let config = ConsolidationConfig::new(["item", "unit"], "qty").unwrap();
        let lines = vec![
            line(json!({"item": "A", "unit": "pc", "qty": 2})),
            line(json!({"item": "A", "unit": "pc", "qty": 3})),
        ];

        let result = consolidate(&lines, &config);

        assert_eq!(
            result,
            Consolidation::Consolidated(vec![line(json!({"item": "A", "unit": "pc", "qty": 5}))])
        );
    }

    #[test]
    fn keeps_first_occurrence_order() {
        let lines = vec![
            line(json!({"item": "A", "qty": 2})),
            line(json!({"item": "B", "qty": 1})),
            line(json!({"item": "A", "qty": 3})),
        ];

        let merged = consolidate(&lines, &item_config())
            .into_lines()
            .expect("duplicates merged");

        assert_eq!(
            merged,
            vec![
                line(json!({"item": "A", "qty": 5})),
                line(json!({"item": "B", "qty": 1})),
            ]
        );
    }

    #[test]
    fn non_numeric_quantities_sum_to_zero() {
        let single = vec![line(json!({"item": "A", "qty": "abc"}))];
        assert!(consolidate(&single, &item_config()).is_unchanged());

        let doubled = vec![
            line(json!({"item": "A", "qty": "abc"})),
            line(json!({"item": "A", "qty": "abc"})),
        ];
        let merged = consolidate(&doubled, &item_config()).into_lines().unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].get("qty"), Some(&FieldValue::from(0.0)));
    }

    #[test]
    fn conversion_factor_comes_from_the_member_that_supplies_it() {
        let lines = vec![
            line(json!({"item": "A", "unit": "box", "qty": 4})),
            line(json!({"item": "A", "unit": "box", "qty": 6, "conversion_factor": 2})),
        ];

        let merged = consolidate(&lines, &stock_config()).into_lines().unwrap();

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].get("qty"), Some(&FieldValue::from(10.0)));
        assert_eq!(merged[0].get("stock_qty"), Some(&FieldValue::from(20.0)));
        assert!(!merged[0].contains("conversion_factor"));
    }

    #[test]
    fn conversion_factor_defaults_to_one() {
        let lines = vec![
            line(json!({"item": "A", "unit": "m", "qty": 1.5})),
            line(json!({"item": "A", "unit": "m", "qty": 2.5, "conversion_factor": ""})),
        ];

        let merged = consolidate(&lines, &stock_config()).into_lines().unwrap();

        assert_eq!(merged[0].get("stock_qty"), Some(&FieldValue::from(4.0)));
        assert!(!merged[0].contains("conversion_factor"));
    }

    #[test]
    fn explicit_zero_factor_is_kept() {
        let lines = vec![
            line(json!({"item": "A", "unit": "set", "qty": 2, "conversion_factor": 0})),
            line(json!({"item": "A", "unit": "set", "qty": 3, "conversion_factor": 4})),
        ];

        let merged = consolidate(&lines, &stock_config()).into_lines().unwrap();

        assert_eq!(merged[0].get("stock_qty"), Some(&FieldValue::from(0.0)));
        assert_eq!(merged[0].get("conversion_factor"), Some(&FieldValue::from(0.0)));
    }

    #[test]
    fn textual_factor_is_read_from_its_numeric_prefix() {
        let lines = vec![
            line(json!({"item": "A", "unit": "box", "qty": 1, "conversion_factor": "abc"})),
            line(json!({"item": "A", "unit": "box", "qty": 1, "conversion_factor": "6 pcs"})),
        ];

        let merged = consolidate(&lines, &stock_config()).into_lines().unwrap();

        assert_eq!(merged[0].get("stock_qty"), Some(&FieldValue::from(12.0)));
        assert_eq!(merged[0].get("conversion_factor"), Some(&FieldValue::from("abc")));
    }

    #[test]
    fn template_conversion_factor_wins() {
        let lines = vec![
            line(json!({"item": "A", "unit": "box", "qty": 1, "conversion_factor": 12})),
            line(json!({"item": "A", "unit": "box", "qty": 2, "conversion_factor": 6})),
        ];

        let merged = consolidate(&lines, &stock_config()).into_lines().unwrap();

        assert_eq!(merged[0].get("stock_qty"), Some(&FieldValue::from(36.0)));
    }

    #[test]
    fn derived_quantity_without_factor_field_equals_quantity() {
        let config = item_config()
            .with_derived_quantity("transfer_qty")
            .expect("valid config");
        let lines = vec![
            line(json!({"item": "A", "qty": 2})),
            line(json!({"item": "A", "qty": 2})),
        ];

        let merged = consolidate(&lines, &config).into_lines().unwrap();

        assert_eq!(merged[0].get("transfer_qty"), Some(&FieldValue::from(4.0)));
        assert!(!merged[0].contains("conversion_factor"));
    }

    #[test]
    fn empty_input_is_unchanged() {
        assert_eq!(consolidate(&[], &item_config()), Consolidation::Unchanged);
    }

    #[test]
    fn bookkeeping_fields_are_dropped() {
        let lines = vec![
            line(json!({
                "name": "row-1", "owner": "admin", "parent": "PO-0001",
                "parenttype": "Purchase Order", "parentfield": "items", "idx": 1,
                "item": "A", "qty": 1, "description": "Casement sash"
            })),
            line(json!({"name": "row-2", "idx": 2, "item": "A", "qty": 1})),
        ];

        let merged = consolidate(&lines, &item_config()).into_lines().unwrap();

        for field in BOOKKEEPING_FIELDS {
            assert!(!merged[0].contains(field), "{field} leaked into merged line");
        }
        assert_eq!(
            merged[0].get("description"),
            Some(&FieldValue::String("Casement sash".into()))
        );
    }

    #[test]
    fn missing_and_null_key_values_group_together() {
        let lines = vec![
            line(json!({"item": "A", "qty": 1})),
            line(json!({"item": "A", "warehouse": null, "qty": 1})),
            line(json!({"item": "A", "warehouse": "", "qty": 1})),
        ];
        let config = ConsolidationConfig::new(["item", "warehouse"], "qty").unwrap();

        let merged = consolidate(&lines, &config).into_lines().unwrap();

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].get("qty"), Some(&FieldValue::from(3.0)));
    }

    #[test]
    fn keys_do_not_collide_on_separator() {
        let config = ConsolidationConfig::new(["a", "b"], "qty").unwrap();
        let left = line(json!({"a": "x||", "b": "y"}));
        let right = line(json!({"a": "x", "b": "||y"}));

        assert_ne!(build_key(&left, config.key_fields()), build_key(&right, config.key_fields()));
        assert_eq!(build_key(&left, config.key_fields()).to_string(), "x||||y");
    }

    #[test]
    fn numbers_and_their_text_form_share_a_key() {
        let fields = vec!["length".to_string()];
        let numeric = line(json!({"length": 2400}));
        let text = line(json!({"length": "2400"}));

        assert_eq!(build_key(&numeric, &fields), build_key(&text, &fields));
    }

    #[test]
    fn coercion_is_lenient() {
        let text = |value: &str| FieldValue::String(value.to_string());

        assert_eq!(coerce_number(Some(&FieldValue::from(2.5))), 2.5);
        assert_eq!(coerce_number(Some(&text(" 12.5 pcs"))), 12.5);
        assert_eq!(coerce_number(Some(&text("-3"))), -3.0);
        assert_eq!(coerce_number(Some(&text(".5"))), 0.5);
        assert_eq!(coerce_number(Some(&text("1e3"))), 1000.0);
        assert_eq!(coerce_number(Some(&text("7e"))), 7.0);
        assert_eq!(coerce_number(Some(&text(""))), 0.0);
        assert_eq!(coerce_number(Some(&text("abc"))), 0.0);
        assert_eq!(coerce_number(Some(&text("-"))), 0.0);
        assert_eq!(coerce_number(Some(&FieldValue::Boolean(true))), 0.0);
        assert_eq!(coerce_number(Some(&FieldValue::Null)), 0.0);
        assert_eq!(coerce_number(None), 0.0);
    }

    #[test]
    fn config_requires_keys_and_quantity() {
        let no_keys: [&str; 0] = [];
        assert!(matches!(
            ConsolidationConfig::new(no_keys, "qty"),
            Err(ToolError::InvalidConfig(_))
        ));
        assert!(matches!(
            ConsolidationConfig::new(["item"], " "),
            Err(ToolError::InvalidConfig(_))
        ));
        assert!(matches!(
            ConsolidationConfig::new(["item", ""], "qty"),
            Err(ToolError::InvalidConfig(_))
        ));
    }

    #[test]
    fn written_fields_may_not_be_key_fields() {
        assert!(matches!(
            ConsolidationConfig::new(["item", "qty"], "qty"),
            Err(ToolError::InvalidConfig(_))
        ));
        assert!(matches!(
            ConsolidationConfig::new(["item", "conversion_factor"], "qty")
                .and_then(|config| config.with_conversion_factor("conversion_factor")),
            Err(ToolError::InvalidConfig(_))
        ));
        assert!(matches!(
            ConsolidationConfig::new(["item", "stock_qty"], "qty")
                .and_then(|config| config.with_derived_quantity("stock_qty")),
            Err(ToolError::InvalidConfig(_))
        ));
    }

    #[test]
    fn written_fields_must_be_distinct() {
        assert!(matches!(
            ConsolidationConfig::new(["item"], "qty")
                .and_then(|config| config.with_derived_quantity("qty")),
            Err(ToolError::InvalidConfig(_))
        ));
        assert!(matches!(
            ConsolidationConfig::new(["item"], "qty")
                .and_then(|config| config.with_derived_quantity("stock_qty"))
                .and_then(|config| config.with_conversion_factor("stock_qty")),
            Err(ToolError::InvalidConfig(_))
        ));
    }

    #[test]
    fn config_deserialization_validates() {
        let parsed: ConsolidationConfig = serde_json::from_value(json!({
            "key_fields": ["item_code", "uom"],
            "quantity_field": "qty",
            "derived_quantity_field": "stock_qty",
            "conversion_factor_field": ""
        }))
        .expect("config parsed");
        assert_eq!(parsed.derived_quantity_field(), Some("stock_qty"));
        assert_eq!(parsed.conversion_factor_field(), None);

        let rejected = serde_json::from_value::<ConsolidationConfig>(json!({
            "key_fields": [],
            "quantity_field": "qty"
        }));
        assert!(rejected.is_err());

        let factor_in_key = serde_json::from_value::<ConsolidationConfig>(json!({
            "key_fields": ["item_code", "conversion_factor"],
            "quantity_field": "qty",
            "conversion_factor_field": "conversion_factor"
        }));
        assert!(factor_in_key.is_err());
    }
}
