use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, StringRecord};

use crate::domain::entities::workbook::{RawSheet, Scalar, Workbook};

const CANDIDATE_DELIMITERS: [u8; 3] = [b'\t', b',', b';'];

fn field_to_scalar(field: &str) -> Scalar {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Scalar::Null;
    }
    match trimmed.parse::<f64>() {
        Ok(number) if number.is_finite() => Scalar::Number(number),
        _ => Scalar::Text(field.to_string()),
    }
}

fn record_to_row(record: &StringRecord) -> Vec<Scalar> {
    let mut row: Vec<Scalar> = record.iter().map(field_to_scalar).collect();
    while row.last().is_some_and(Scalar::is_empty) {
        row.pop();
    }
    row
}

fn read_rows<R: Read>(reader: R, delimiter: u8) -> Result<Vec<Vec<Scalar>>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("failed to parse csv record")?;
        rows.push(record_to_row(&record));
    }
    Ok(rows)
}

/// Picks the delimiter that splits the first non-blank line into the most fields.
/// Ties go to the earlier candidate, so tab wins over comma wins over semicolon.
pub fn sniff_delimiter(text: &str) -> u8 {
    let Some(first_line) = text.lines().find(|line| !line.trim().is_empty()) else {
        return b',';
    };
    let mut best = (b',', 0_usize);
    for delimiter in CANDIDATE_DELIMITERS {
        let count = first_line.bytes().filter(|byte| *byte == delimiter).count();
        if count > best.1 {
            best = (delimiter, count);
        }
    }
    best.0
}

/// Reads a `.csv` file into a one-sheet workbook named after the file stem.
pub fn read_csv(csv_path: &Path) -> Result<Workbook> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open csv: {}", csv_path.display()))?;
    let rows = read_rows(file, b',')
        .with_context(|| format!("failed to read csv: {}", csv_path.display()))?;

    let sheet_name = csv_path
        .file_stem()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("Sheet1")
        .to_string();

    Ok(Workbook::new(vec![RawSheet::new(sheet_name, rows)]))
}

/// Turns pasted tabular text into a one-sheet workbook.
pub fn parse_pasted_text(text: &str, sheet_name: &str) -> Result<Workbook> {
    if text.trim().is_empty() {
        bail!("pasted text is empty");
    }
    let rows = read_rows(text.as_bytes(), sniff_delimiter(text))?;
    Ok(Workbook::new(vec![RawSheet::new(sheet_name, rows)]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffing_prefers_the_most_frequent_delimiter() {
        assert_eq!(sniff_delimiter("a\tb\tc\n1\t2\t3"), b'\t');
        assert_eq!(sniff_delimiter("a,b,c\n1,2,3"), b',');
        assert_eq!(sniff_delimiter("\n\na;b;c\n1;2;3"), b';');
        assert_eq!(sniff_delimiter("single"), b',');
    }

    #[test]
    fn pasted_spreadsheet_selection_keeps_ragged_rows() {
        let workbook =
            parse_pasted_text("Part\tQty\tNote\nbolt\t12\nnut\t4\tspare\n", "Pasted")
                .expect("paste should parse");

        let sheet = workbook.sheet("Pasted").expect("sheet should exist");
        assert_eq!(sheet.row_count(), 3);
        assert_eq!(sheet.rows[1], vec![Scalar::from("bolt"), Scalar::Number(12.0)]);
        assert_eq!(sheet.rows[2][2], Scalar::from("spare"));
    }

    #[test]
    fn empty_paste_is_rejected() {
        assert!(parse_pasted_text("  \n ", "Pasted").is_err());
    }

    #[test]
    fn csv_file_becomes_sheet_named_after_stem() {
        let temp_dir = tempfile::tempdir().expect("should create temp dir");
        let path = temp_dir.path().join("inventory.csv");
        std::fs::write(&path, "Part,Qty\nbolt,12\nwasher,\n").expect("should write csv");

        let workbook = read_csv(&path).expect("csv should parse");

        assert_eq!(workbook.sheet_names(), vec!["inventory"]);
        let sheet = workbook.sheet("inventory").expect("sheet should exist");
        assert_eq!(sheet.rows[0], vec![Scalar::from("Part"), Scalar::from("Qty")]);
        assert_eq!(sheet.rows[2], vec![Scalar::from("washer")]);
    }
}
