use std::path::Path;

use rust_xlsxwriter::{Table, Workbook};

use crate::fenestra::tools::error::Result;
use crate::fenestra::tools::model::{FieldValue, Line};

/// Writes `lines` to a single-sheet workbook at `path`.
///
/// The header row is the union of all field names in first-seen order; a
/// line without a given field leaves its cell empty.
pub fn write_lines(path: &Path, sheet_name: &str, lines: &[Line]) -> Result<()> {
    let columns = collect_columns(lines);

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)?;

    for (col_idx, header) in columns.iter().enumerate() {
        worksheet.write_string(0, col_idx as u16, header)?;
    }

    for (row_idx, line) in lines.iter().enumerate() {
        let row = (row_idx + 1) as u32;
        for (col_idx, column) in columns.iter().enumerate() {
            let col = col_idx as u16;
            match line.get(column) {
                Some(FieldValue::String(value)) => {
                    worksheet.write_string(row, col, value)?;
                }
                Some(FieldValue::Number(value)) => {
                    worksheet.write_number(row, col, value.as_f64().unwrap_or_default())?;
                }
                Some(FieldValue::Boolean(value)) => {
                    worksheet.write_boolean(row, col, *value)?;
                }
                Some(FieldValue::Null) | None => {}
            }
        }
    }

    if !columns.is_empty() && !lines.is_empty() {
        let mut excel_table = Table::new();
        excel_table.set_autofilter(true);
        let col_end = (columns.len() as u16).saturating_sub(1);
        worksheet.add_table(0, 0, lines.len() as u32, col_end, &excel_table)?;
    }

    workbook.save(path)?;
    Ok(())
}

fn collect_columns(lines: &[Line]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for line in lines {
        for (name, _) in line.fields() {
            if !columns.iter().any(|column| column == name) {
                columns.push(name.to_string());
            }
        }
    }
    columns
}
