//! Raw grid -> `{columns, rows}` normalization.
//!
//! The first row with any non-empty cell is the header. Blank headers become
//! `Column N`, repeated headers get a `_2`, `_3`, ... suffix, and cells to the
//! right of the header get generated columns of their own. Fully empty data
//! rows are dropped and empty cells are left out of the record.

use std::collections::HashSet;

use crate::domain::entities::workbook::{ParsedSheet, RawSheet, Record, Scalar};
use crate::usecase::ports::parser::{CancelFlag, ParseError, ParseRequest, SheetParser};

const SHEET_LABEL_COLUMN: &str = "Sheet";
const SHEET_LABEL_FALLBACK: &str = "Source Sheet";

/// The default parser behind the parse worker boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizingParser;

impl SheetParser for NormalizingParser {
    fn parse(&self, request: &ParseRequest, cancel: &CancelFlag) -> Result<ParsedSheet, ParseError> {
        let sheets = request.sheets()?;
        if request.selection.is_single() {
            match sheets.first() {
                Some(sheet) => normalize_sheet(sheet, request.chunk_rows, cancel),
                None => Err(ParseError::Failed("empty selection".to_string())),
            }
        } else {
            merge_sheets(&sheets, &request.all_sheet_names(), request.chunk_rows, cancel)
        }
    }
}

#[derive(Debug, Default)]
struct ColumnSet {
    ordered: Vec<String>,
    seen: HashSet<String>,
}

impl ColumnSet {
    /// Adds `name`, suffixing it until it is unique. Returns the stored name.
    fn push_unique(&mut self, name: String) -> String {
        let mut candidate = name.clone();
        let mut suffix = 2;
        while self.seen.contains(&candidate) {
            candidate = format!("{name}_{suffix}");
            suffix += 1;
        }
        self.seen.insert(candidate.clone());
        self.ordered.push(candidate.clone());
        candidate
    }

    /// Adds `name` only if it is not present yet.
    fn push_shared(&mut self, name: &str) {
        if self.seen.insert(name.to_string()) {
            self.ordered.push(name.to_string());
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.seen.contains(name)
    }
}

fn header_label(cell: Option<&Scalar>, col_idx: usize) -> String {
    let text = cell.map(|value| value.to_string()).unwrap_or_default();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        format!("Column {}", col_idx + 1)
    } else {
        trimmed.to_string()
    }
}

fn is_blank_row(row: &[Scalar]) -> bool {
    row.iter().all(Scalar::is_empty)
}

pub fn normalize_sheet(
    sheet: &RawSheet,
    chunk_rows: usize,
    cancel: &CancelFlag,
) -> Result<ParsedSheet, ParseError> {
    let Some(header_idx) = sheet.rows.iter().position(|row| !is_blank_row(row)) else {
        return Ok(ParsedSheet::default());
    };

    let header_row = &sheet.rows[header_idx];
    let mut columns = ColumnSet::default();
    let mut names: Vec<String> = header_row
        .iter()
        .enumerate()
        .map(|(col_idx, cell)| columns.push_unique(header_label(Some(cell), col_idx)))
        .collect();

    let data = &sheet.rows[header_idx + 1..];
    let mut rows = Vec::with_capacity(data.len());
    for chunk in data.chunks(chunk_rows.max(1)) {
        if cancel.is_cancelled() {
            return Err(ParseError::Cancelled);
        }

        for raw in chunk {
            if is_blank_row(raw) {
                continue;
            }
            let mut record = Record::new();
            for (col_idx, cell) in raw.iter().enumerate() {
                if cell.is_empty() {
                    continue;
                }
                while names.len() <= col_idx {
                    let generated = header_label(None, names.len());
                    names.push(columns.push_unique(generated));
                }
                record.insert(names[col_idx].clone(), cell.clone());
            }
            rows.push(record);
        }

        std::thread::yield_now();
    }

    Ok(ParsedSheet {
        columns: columns.ordered,
        rows,
    })
}

/// Merges several sheets into one table with a leading sheet-label column.
///
/// Sheets are merged in workbook order, so the result does not depend on the
/// order the user picked them in.
pub fn merge_sheets(
    sheets: &[&RawSheet],
    all_sheet_names: &[String],
    chunk_rows: usize,
    cancel: &CancelFlag,
) -> Result<ParsedSheet, ParseError> {
    let mut ordered: Vec<&RawSheet> = sheets.to_vec();
    ordered.sort_by_key(|sheet| {
        all_sheet_names
            .iter()
            .position(|name| *name == sheet.name)
            .unwrap_or(usize::MAX)
    });
    ordered.dedup_by(|a, b| a.name == b.name);

    let mut parsed = Vec::with_capacity(ordered.len());
    for sheet in &ordered {
        parsed.push((sheet.name.as_str(), normalize_sheet(sheet, chunk_rows, cancel)?));
    }

    let label_taken = parsed
        .iter()
        .any(|(_, sheet)| sheet.columns.iter().any(|c| c == SHEET_LABEL_COLUMN));
    let mut columns = ColumnSet::default();
    let label = if label_taken {
        let mut taken = ColumnSet::default();
        for (_, sheet) in &parsed {
            for column in &sheet.columns {
                taken.push_shared(column);
            }
        }
        if taken.contains(SHEET_LABEL_FALLBACK) {
            taken.push_unique(SHEET_LABEL_FALLBACK.to_string())
        } else {
            SHEET_LABEL_FALLBACK.to_string()
        }
    } else {
        SHEET_LABEL_COLUMN.to_string()
    };
    columns.push_shared(&label);

    let mut rows = Vec::new();
    for (sheet_name, sheet) in parsed {
        for column in &sheet.columns {
            columns.push_shared(column);
        }
        for mut record in sheet.rows {
            record.insert(label.clone(), Scalar::Text(sheet_name.to_string()));
            rows.push(record);
        }
    }

    Ok(ParsedSheet {
        columns: columns.ordered,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> Scalar {
        Scalar::Text(value.to_string())
    }

    fn sheet(name: &str, rows: Vec<Vec<Scalar>>) -> RawSheet {
        RawSheet::new(name, rows)
    }

    #[test]
    fn header_row_is_first_non_empty_row() {
        let raw = sheet(
            "S",
            vec![
                vec![Scalar::Null, text(" ")],
                vec![text("Name"), text("Qty")],
                vec![text("bolt"), Scalar::Number(4.0)],
            ],
        );

        let parsed = normalize_sheet(&raw, 10, &CancelFlag::new()).expect("parse should succeed");

        assert_eq!(parsed.columns, vec!["Name", "Qty"]);
        assert_eq!(parsed.row_count(), 1);
        assert_eq!(parsed.value(0, "Qty"), Some(&Scalar::Number(4.0)));
    }

    #[test]
    fn blank_and_duplicate_headers_are_made_unique() {
        let raw = sheet(
            "S",
            vec![
                vec![text("Code"), Scalar::Null, text("Code")],
                vec![text("a"), text("b"), text("c")],
            ],
        );

        let parsed = normalize_sheet(&raw, 10, &CancelFlag::new()).expect("parse should succeed");

        assert_eq!(parsed.columns, vec!["Code", "Column 2", "Code_2"]);
        assert_eq!(parsed.value(0, "Code_2"), Some(&text("c")));
    }

    #[test]
    fn empty_cells_and_rows_are_omitted_and_extra_cells_get_columns() {
        let raw = sheet(
            "S",
            vec![
                vec![text("A")],
                vec![Scalar::Null, Scalar::Null],
                vec![Scalar::Null, text("overflow")],
            ],
        );

        let parsed = normalize_sheet(&raw, 1, &CancelFlag::new()).expect("parse should succeed");

        assert_eq!(parsed.columns, vec!["A", "Column 2"]);
        assert_eq!(parsed.row_count(), 1);
        assert!(parsed.rows[0].get("A").is_none());
        for row in &parsed.rows {
            assert!(row.keys().all(|key| parsed.columns.contains(key)));
        }
    }

    #[test]
    fn cancelled_parse_stops_between_chunks() {
        let raw = sheet("S", vec![vec![text("A")], vec![text("1")]]);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = normalize_sheet(&raw, 1, &cancel);

        assert_eq!(result, Err(ParseError::Cancelled));
    }

    #[test]
    fn merge_labels_rows_and_follows_workbook_order() {
        let first = sheet("Jan", vec![vec![text("Item")], vec![text("a")]]);
        let second = sheet(
            "Feb",
            vec![vec![text("Item"), text("Note")], vec![text("b"), text("late")]],
        );
        let all = vec!["Jan".to_string(), "Feb".to_string()];

        let merged = merge_sheets(&[&second, &first], &all, 10, &CancelFlag::new())
            .expect("merge should succeed");

        assert_eq!(merged.columns, vec!["Sheet", "Item", "Note"]);
        assert_eq!(merged.value(0, "Sheet"), Some(&text("Jan")));
        assert_eq!(merged.value(1, "Sheet"), Some(&text("Feb")));
        assert_eq!(merged.value(1, "Note"), Some(&text("late")));
    }

    #[test]
    fn merge_avoids_clobbering_existing_sheet_column() {
        let only = sheet("Raw", vec![vec![text("Sheet")], vec![text("x")]]);
        let all = vec!["Raw".to_string()];

        let merged =
            merge_sheets(&[&only], &all, 10, &CancelFlag::new()).expect("merge should succeed");

        assert_eq!(merged.columns, vec!["Source Sheet", "Sheet"]);
        assert_eq!(merged.value(0, "Sheet"), Some(&text("x")));
        assert_eq!(merged.value(0, "Source Sheet"), Some(&text("Raw")));
    }
}
