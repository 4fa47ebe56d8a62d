//! Call-site table: which child collection of which document kind is
//! consolidated, and how.
//!
//! The built-in table covers the buying, stock, selling and material request
//! documents of the manufacturing workflow. Further kinds are added through
//! [`CallSiteTable::insert`] or a JSON overlay file, without touching the
//! engine.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fenestra::tools::consolidate::ConsolidationConfig;
use crate::fenestra::tools::error::{Result, ToolError};

/// Child table scanned by every built-in document kind.
pub const DEFAULT_CHILD_TABLE: &str = "items";

/// Profile, cut length and jalousie attributes that distinguish otherwise
/// identical window/door items.
pub const ATTRIBUTE_FIELDS: [&str; 5] = [
    "custom_profile_type",
    "custom_profile_length",
    "custom_jalousie_model",
    "custom_jalousie_width",
    "custom_jalousie_height",
];

pub const PURCHASE_ORDER: &str = "Purchase Order";
pub const STOCK_ENTRY: &str = "Stock Entry";
pub const SALES_ORDER: &str = "Sales Order";
pub const DELIVERY_NOTE: &str = "Delivery Note";
pub const PURCHASE_RECEIPT: &str = "Purchase Receipt";
pub const SALES_INVOICE: &str = "Sales Invoice";
pub const MATERIAL_REQUEST: &str = "Material Request";

/// One consolidation entry point: the child table to scan and its config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSite {
    #[serde(default = "default_child_table")]
    pub child_table: String,
    #[serde(flatten)]
    pub config: ConsolidationConfig,
}

fn default_child_table() -> String {
    DEFAULT_CHILD_TABLE.to_string()
}

impl CallSite {
    pub fn new(child_table: impl Into<String>, config: ConsolidationConfig) -> Self {
        Self {
            child_table: child_table.into(),
            config,
        }
    }
}

/// Document kind → call site mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallSiteTable {
    #[serde(default)]
    kinds: BTreeMap<String, CallSite>,
}

impl CallSiteTable {
    /// Table with the call sites shipped with the tool.
    pub fn builtin() -> Self {
        let mut table = Self::default();

        table.insert(
            PURCHASE_ORDER,
            stock_site(&["item_code", "uom"], "stock_qty"),
        );
        table.insert(
            STOCK_ENTRY,
            stock_site(
                &[
                    "item_code",
                    "uom",
                    "s_warehouse",
                    "t_warehouse",
                    "batch_no",
                    "serial_and_batch_bundle",
                ],
                "transfer_qty",
            ),
        );
        table.insert(
            SALES_ORDER,
            stock_site(&["item_code", "uom", "warehouse"], "stock_qty"),
        );
        for kind in [DELIVERY_NOTE, PURCHASE_RECEIPT, SALES_INVOICE] {
            table.insert(
                kind,
                stock_site(
                    &[
                        "item_code",
                        "uom",
                        "warehouse",
                        "batch_no",
                        "serial_and_batch_bundle",
                    ],
                    "stock_qty",
                ),
            );
        }
        table.insert(
            MATERIAL_REQUEST,
            CallSite::new(
                DEFAULT_CHILD_TABLE,
                builtin_config(&["item_code", "uom", "warehouse"]),
            ),
        );

        table
    }

    /// Loads a table from a JSON file of the form `{"kinds": {...}}`.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let source = fs::read_to_string(path)?;
        let table: CallSiteTable = serde_json::from_str(&source)?;
        debug!(path = %path.display(), kinds = table.len(), "loaded call-site table");
        Ok(table)
    }

    /// Built-in table overlaid with the entries from `path`, if given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut table = Self::builtin();
        if let Some(path) = path {
            table.merge(Self::from_path(path)?);
        }
        Ok(table)
    }

    /// Overlays `other`: its entries replace same-named kinds.
    pub fn merge(&mut self, other: CallSiteTable) {
        self.kinds.extend(other.kinds);
    }

    pub fn insert(&mut self, kind: impl Into<String>, call_site: CallSite) {
        self.kinds.insert(kind.into(), call_site);
    }

    pub fn get(&self, kind: &str) -> Option<&CallSite> {
        self.kinds.get(kind)
    }

    /// Looks up `kind`, failing when it is not registered.
    pub fn require(&self, kind: &str) -> Result<&CallSite> {
        self.get(kind)
            .ok_or_else(|| ToolError::UnknownDocumentKind(kind.to_string()))
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

fn builtin_config(keys: &[&str]) -> ConsolidationConfig {
    let key_fields = keys.iter().chain(ATTRIBUTE_FIELDS.iter()).copied();
    match ConsolidationConfig::new(key_fields, "qty") {
        Ok(config) => config,
        Err(err) => unreachable!("built-in call site is valid: {err}"),
    }
}

fn stock_site(keys: &[&str], derived_field: &str) -> CallSite {
    let config = builtin_config(keys)
        .with_derived_quantity(derived_field)
        .and_then(|config| config.with_conversion_factor("conversion_factor"));
    match config {
        Ok(config) => CallSite::new(DEFAULT_CHILD_TABLE, config),
        Err(err) => unreachable!("built-in call site is valid: {err}"),
    }
}
