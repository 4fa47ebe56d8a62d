use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the different failure cases that can occur when the
/// tool loads documents, consolidates line collections, or writes them back.
///
/// Malformed line data is deliberately absent from this list: quantities and
/// key fields are coerced leniently by the engine and never fail.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Raised when a bulk-import sheet does not follow the expected layout.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when a consolidation configuration is incomplete, e.g. an empty
    /// key field list or a blank quantity field name.
    #[error("invalid consolidation config: {0}")]
    InvalidConfig(String),

    /// Raised when no call site is registered for a document kind.
    #[error("no consolidation call site registered for document kind '{0}'")]
    UnknownDocumentKind(String),

    /// Raised when a document lacks the child table its call site scans.
    #[error("document kind '{kind}' has no child table '{table}'")]
    MissingChildTable { kind: String, table: String },

    /// Raised when a parent document snapshot is structurally invalid.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
