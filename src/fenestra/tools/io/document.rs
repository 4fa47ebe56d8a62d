use std::fs;
use std::path::Path;

use crate::fenestra::tools::error::Result;
use crate::fenestra::tools::model::Document;

/// Reads a parent document snapshot from a JSON file.
pub fn read_document(path: &Path) -> Result<Document> {
    let source = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&source)?)
}

/// Writes `document` as pretty-printed JSON.
pub fn write_document(path: &Path, document: &Document) -> Result<()> {
    let json_string = serde_json::to_string_pretty(document)?;
    fs::write(path, json_string)?;
    Ok(())
}
