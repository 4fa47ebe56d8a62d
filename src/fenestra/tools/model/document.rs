use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fenestra::tools::error::{Result, ToolError};
use crate::fenestra::tools::guard::InstanceId;
use crate::fenestra::tools::model::Line;

/// Lifecycle state of a parent document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DocStatus {
    #[default]
    Draft,
    Submitted,
    Cancelled,
}

impl TryFrom<u8> for DocStatus {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(DocStatus::Draft),
            1 => Ok(DocStatus::Submitted),
            2 => Ok(DocStatus::Cancelled),
            other => Err(format!("unknown docstatus {other}")),
        }
    }
}

impl From<DocStatus> for u8 {
    fn from(status: DocStatus) -> Self {
        match status {
            DocStatus::Draft => 0,
            DocStatus::Submitted => 1,
            DocStatus::Cancelled => 2,
        }
    }
}

/// A header field of a document: either a child table of scalar rows or any
/// other JSON value, kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocField {
    Table(Vec<Line>),
    Value(serde_json::Value),
}

/// In-memory snapshot of a parent document and its child collections.
///
/// Every loaded value is a distinct instance with its own [`InstanceId`];
/// the id is not part of the serialized form. Cloning yields a new instance.
#[derive(Debug, Serialize, Deserialize)]
pub struct Document {
    #[serde(skip)]
    instance: InstanceId,
    pub doctype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub docstatus: DocStatus,
    #[serde(flatten)]
    pub fields: BTreeMap<String, DocField>,
}

impl Clone for Document {
    fn clone(&self) -> Self {
        Self {
            instance: InstanceId::new(),
            doctype: self.doctype.clone(),
            name: self.name.clone(),
            docstatus: self.docstatus,
            fields: self.fields.clone(),
        }
    }
}

impl Document {
    pub fn new(doctype: impl Into<String>) -> Self {
        Self {
            instance: InstanceId::new(),
            doctype: doctype.into(),
            name: None,
            docstatus: DocStatus::Draft,
            fields: BTreeMap::new(),
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn is_draft(&self) -> bool {
        self.docstatus == DocStatus::Draft
    }

    /// Returns the rows of child table `table`.
    pub fn child_table(&self, table: &str) -> Result<&[Line]> {
        match self.fields.get(table) {
            Some(DocField::Table(lines)) => Ok(lines),
            Some(DocField::Value(_)) => Err(ToolError::InvalidDocument(format!(
                "field '{table}' is not a table of scalar rows"
            ))),
            None => Err(ToolError::MissingChildTable {
                kind: self.doctype.clone(),
                table: table.to_string(),
            }),
        }
    }

    /// Replaces child table `table` with `lines`, giving every row a fresh
    /// identity, its position and the link back to this document.
    pub fn replace_child_table(&mut self, table: &str, mut lines: Vec<Line>) {
        for (position, line) in lines.iter_mut().enumerate() {
            line.set("name", Uuid::new_v4().to_string());
            line.set("idx", (position + 1) as i64);
            line.set("parentfield", table);
            line.set("parenttype", self.doctype.clone());
            if let Some(parent) = &self.name {
                line.set("parent", parent.clone());
            }
        }
        self.fields.insert(table.to_string(), DocField::Table(lines));
    }
}
