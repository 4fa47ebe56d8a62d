use std::collections::HashSet;
use std::path::Path;

use calamine::{DataType, Reader, Xlsx, open_workbook};

use crate::fenestra::tools::error::{Result, ToolError};
use crate::fenestra::tools::model::{FieldValue, Line};

/// Reads the lines of a bulk-import sheet.
///
/// The first row holds field names, every further row one line. Empty cells
/// are left out of the line and rows without any filled cell are skipped.
/// When `sheet` is `None` the first sheet of the workbook is used.
pub fn read_lines(path: &Path, sheet: Option<&str>) -> Result<Vec<Line>> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ToolError::InvalidWorkbook("workbook has no sheets".into()))?,
    };
    let range = read_required_sheet(&mut workbook, &sheet_name)?;

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(first_row) => parse_headers(first_row)?,
        None => return Ok(Vec::new()),
    };

    let mut lines = Vec::new();
    for row in rows {
        let line: Line = row
            .iter()
            .zip(&headers)
            .filter_map(|(cell, header)| {
                let header = header.as_ref()?;
                cell_to_value(cell).map(|value| (header.clone(), value))
            })
            .collect();
        if !line.is_empty() {
            lines.push(line);
        }
    }

    Ok(lines)
}

fn read_required_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    name: &str,
) -> Result<calamine::Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("missing sheet '{name}'")))?;
    let range = range_result.map_err(ToolError::from)?;
    Ok(range)
}

/// Blank header cells yield `None`; their column is ignored.
fn parse_headers(row: &[DataType]) -> Result<Vec<Option<String>>> {
    let mut seen = HashSet::new();
    let mut headers = Vec::with_capacity(row.len());

    for cell in row {
        let header = cell_to_string(cell).trim().to_string();
        if header.is_empty() {
            headers.push(None);
            continue;
        }
        if !seen.insert(header.clone()) {
            return Err(ToolError::InvalidWorkbook(format!(
                "duplicate column '{header}'"
            )));
        }
        headers.push(Some(header));
    }

    Ok(headers)
}

fn cell_to_string(cell: &DataType) -> String {
    match cell {
        DataType::String(value) => value.clone(),
        DataType::Float(value) => value.to_string(),
        DataType::Int(value) => value.to_string(),
        DataType::Bool(value) => value.to_string(),
        DataType::Empty => String::new(),
        other => other.to_string(),
    }
}

fn cell_to_value(cell: &DataType) -> Option<FieldValue> {
    let value = match cell {
        DataType::Empty => return None,
        DataType::String(value) => FieldValue::String(value.clone()),
        DataType::Float(value) => FieldValue::number(*value),
        DataType::Int(value) => FieldValue::from(*value),
        DataType::Bool(value) => FieldValue::Boolean(*value),
        other => FieldValue::String(other.to_string()),
    };
    (!value.is_blank()).then_some(value)
}
