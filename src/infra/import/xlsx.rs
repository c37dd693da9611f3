use std::path::Path;

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};

use crate::domain::entities::workbook::{RawSheet, Scalar, Workbook};

pub fn cell_to_scalar(cell: &Data) -> Scalar {
    match cell {
        Data::String(v) => Scalar::Text(v.to_string()),
        Data::Float(v) => Scalar::Number(*v),
        Data::Int(v) => Scalar::Number(*v as f64),
        Data::Bool(v) => Scalar::Bool(*v),
        Data::DateTime(v) => Scalar::Text(v.to_string()),
        Data::DateTimeIso(v) => Scalar::Text(v.to_string()),
        Data::DurationIso(v) => Scalar::Text(v.to_string()),
        Data::Error(v) => Scalar::Text(format!("{v:?}")),
        Data::Empty => Scalar::Null,
    }
}

fn trim_trailing_empty(mut row: Vec<Scalar>) -> Vec<Scalar> {
    while row.last().is_some_and(Scalar::is_empty) {
        row.pop();
    }
    row
}

/// Reads every sheet of an `.xlsx`, `.xls` or `.ods` file, in workbook order.
pub fn read_spreadsheet(path: &Path) -> Result<Workbook> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open spreadsheet: {}", path.display()))?;

    let mut sheets = Vec::new();
    for sheet_name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&sheet_name)
            .with_context(|| format!("failed to read sheet: {sheet_name}"))?;
        let rows = range
            .rows()
            .map(|row| trim_trailing_empty(row.iter().map(cell_to_scalar).collect()))
            .collect();
        sheets.push(RawSheet::new(sheet_name, rows));
    }

    Ok(Workbook::new(sheets))
}
