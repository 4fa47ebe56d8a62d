use std::path::Path;

use tracing::{debug, info, instrument};

use crate::fenestra::tools::config::CallSiteTable;
use crate::fenestra::tools::consolidate::{ConsolidationConfig, consolidate};
use crate::fenestra::tools::error::Result;
use crate::fenestra::tools::hooks::{ConsolidationHook, ConsolidationPolicy, HookOutcome, LifecycleEvent};
use crate::fenestra::tools::io::{document, excel_read, excel_write};

/// Sheet name used when writing consolidated bulk-import lines.
pub const LINES_SHEET: &str = "Lines";

/// Consolidates the child table of a JSON document and writes the result.
///
/// The document is validated the way a save would validate it; when nothing
/// is merged the document is written back unchanged.
#[instrument(
    level = "info",
    skip_all,
    fields(input = %input.display(), output = %output.display(), ?policy)
)]
pub fn consolidate_document_file(
    input: &Path,
    output: &Path,
    table: CallSiteTable,
    policy: ConsolidationPolicy,
) -> Result<HookOutcome> {
    let mut doc = document::read_document(input)?;
    info!(doctype = %doc.doctype, "loaded document");

    let hook = ConsolidationHook::new(table, policy);
    let outcome = hook.fire(&mut doc, LifecycleEvent::Validate)?;
    debug!(?outcome, "validation hook finished");

    document::write_document(output, &doc)?;
    Ok(outcome)
}

/// Consolidates the lines of a bulk-import workbook.
///
/// Returns the number of lines written.
#[instrument(
    level = "info",
    skip_all,
    fields(input = %input.display(), output = %output.display())
)]
pub fn consolidate_sheet(
    input: &Path,
    output: &Path,
    sheet: Option<&str>,
    config: &ConsolidationConfig,
) -> Result<usize> {
    let lines = excel_read::read_lines(input, sheet)?;
    info!(line_count = lines.len(), "read lines from workbook");

    let lines = consolidate(&lines, config).apply(lines);
    debug!(line_count = lines.len(), "lines after consolidation");

    excel_write::write_lines(output, sheet.unwrap_or(LINES_SHEET), &lines)?;
    Ok(lines.len())
}
