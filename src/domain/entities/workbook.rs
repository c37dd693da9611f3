use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single cell value, both in raw sheets and in parsed records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    pub fn is_empty(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::Number(v) => write!(f, "{v}"),
            Scalar::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

/// One named tab exactly as the origin delivered it: a ragged grid, header included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSheet {
    pub name: String,
    pub rows: Vec<Vec<Scalar>>,
}

impl RawSheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Scalar>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cell_count(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }
}

/// Immutable container of sheets. Replaced wholesale on refresh, never patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    pub sheets: Vec<RawSheet>,
}

impl Workbook {
    pub fn new(sheets: Vec<RawSheet>) -> Self {
        Self { sheets }
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|sheet| sheet.name.clone()).collect()
    }

    pub fn sheet(&self, name: &str) -> Option<&RawSheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sheet(name).is_some()
    }
}

/// Keeps only the named sheets, in workbook order. An empty name list keeps everything.
///
/// Used after a credential-less fetch, which always returns the whole workbook.
pub fn filter_workbook(workbook: &Workbook, names: &[String]) -> Workbook {
    if names.is_empty() {
        return workbook.clone();
    }

    Workbook {
        sheets: workbook
            .sheets
            .iter()
            .filter(|sheet| names.iter().any(|name| *name == sheet.name))
            .cloned()
            .collect(),
    }
}

pub type Record = BTreeMap<String, Scalar>;

/// Normalized `{columns, rows}` view handed to the presentation layer.
///
/// Every record's keys are a subset of `columns`; empty cells are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedSheet {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl ParsedSheet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cell_count(&self) -> usize {
        self.rows.iter().map(BTreeMap::len).sum()
    }

    pub fn value(&self, row_idx: usize, column: &str) -> Option<&Scalar> {
        self.rows.get(row_idx).and_then(|row| row.get(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(name: &str) -> RawSheet {
        RawSheet::new(name, vec![vec![Scalar::from("a")]])
    }

    #[test]
    fn filter_workbook_keeps_workbook_order() {
        let workbook = Workbook::new(vec![sheet("A"), sheet("B"), sheet("C")]);

        let filtered = filter_workbook(&workbook, &["C".to_string(), "A".to_string()]);

        assert_eq!(filtered.sheet_names(), vec!["A", "C"]);
    }

    #[test]
    fn filter_workbook_with_no_names_keeps_everything() {
        let workbook = Workbook::new(vec![sheet("A"), sheet("B")]);

        assert_eq!(filter_workbook(&workbook, &[]), workbook);
    }

    #[test]
    fn blank_text_counts_as_empty() {
        assert!(Scalar::Text("   ".to_string()).is_empty());
        assert!(Scalar::Null.is_empty());
        assert!(!Scalar::Number(0.0).is_empty());
    }
}
