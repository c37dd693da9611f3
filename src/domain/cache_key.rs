//! Deterministic cache keys.
//!
//! Workbook keys address the persistent cache and must be stable across
//! restarts. Sheet keys only ever live in the in-memory parsed-sheet map.

use crate::domain::entities::source::{DataSource, SheetSelection};

const SELECTION_SEPARATOR: char = '\u{1f}';

/// 32-bit rolling hash (`h = h * 31 + b`) over the UTF-8 bytes of `input`.
fn rolling_hash(input: &str) -> u32 {
    input
        .bytes()
        .fold(0_u32, |hash, byte| hash.wrapping_mul(31).wrapping_add(u32::from(byte)))
}

/// Persistent key for a source url, optionally narrowed to a sheet subset.
///
/// The subset is sorted before hashing, so the same set picked in a different
/// order maps to the same entry. Collisions are accepted, not corrected.
pub fn workbook_key(url: &str, selected_sheets: Option<&[String]>) -> String {
    let mut input = url.trim().to_string();
    if let Some(names) = selected_sheets.filter(|names| !names.is_empty()) {
        let mut sorted: Vec<&str> = names.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.dedup();
        for name in sorted {
            input.push(SELECTION_SEPARATOR);
            input.push_str(name);
        }
    }
    format!("wb-{:08x}", rolling_hash(&input))
}

pub fn source_key(source: &DataSource) -> String {
    workbook_key(&source.url, source.selection())
}

/// In-memory key for a parsed selection: `single:<name>` or `multi:<a|b|c>`.
pub fn sheet_key(selection: &SheetSelection) -> String {
    match selection {
        SheetSelection::Single(name) => format!("single:{name}"),
        SheetSelection::Multi(names) => {
            let mut sorted: Vec<&str> = names.iter().map(String::as_str).collect();
            sorted.sort_unstable();
            sorted.dedup();
            format!("multi:{}", sorted.join("|"))
        }
    }
}

/// Inverse of [`sheet_key`], used to restore the selection a cache entry was parsed for.
///
/// Multi keys come back sorted; names containing `|` do not survive.
pub fn selection_from_sheet_key(key: &str) -> Option<SheetSelection> {
    if let Some(name) = key.strip_prefix("single:") {
        return Some(SheetSelection::Single(name.to_string()));
    }
    let names = key.strip_prefix("multi:")?;
    if names.is_empty() {
        return None;
    }
    Some(SheetSelection::Multi(
        names.split('|').map(str::to_string).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_key_can_be_read_back() {
        let multi = SheetSelection::Multi(names(&["b", "a"]));

        assert_eq!(
            selection_from_sheet_key(&sheet_key(&multi)),
            Some(SheetSelection::Multi(names(&["a", "b"])))
        );
        assert_eq!(
            selection_from_sheet_key("single:Totals"),
            Some(SheetSelection::Single("Totals".to_string()))
        );
        assert_eq!(selection_from_sheet_key("bogus"), None);
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn sheet_key_ignores_selection_order() {
        let a = sheet_key(&SheetSelection::Multi(names(&["Q3", "Q1", "Q2"])));
        let b = sheet_key(&SheetSelection::Multi(names(&["Q2", "Q3", "Q1"])));

        assert_eq!(a, b);
        assert_eq!(a, "multi:Q1|Q2|Q3");
    }

    #[test]
    fn single_and_multi_keys_never_collide() {
        let single = sheet_key(&SheetSelection::Single("Q1".to_string()));
        let multi = sheet_key(&SheetSelection::Multi(names(&["Q1"])));

        assert_eq!(single, "single:Q1");
        assert_ne!(single, multi);
    }

    #[test]
    fn workbook_key_is_stable_and_order_independent() {
        let url = "https://sheets.example.com/d/abc123";
        let first = workbook_key(url, Some(&names(&["B", "A"])));
        let second = workbook_key(url, Some(&names(&["A", "B"])));

        assert_eq!(first, second);
        assert_eq!(first, workbook_key(url, Some(&names(&["A", "B"]))));
        assert!(first.starts_with("wb-") && first.len() == 11, "unexpected key {first}");
    }

    #[test]
    fn workbook_key_distinguishes_selection_from_whole_workbook() {
        let url = "https://sheets.example.com/d/abc123";

        assert_ne!(workbook_key(url, None), workbook_key(url, Some(&names(&["A"]))));
        assert_eq!(workbook_key(url, None), workbook_key(url, Some(&[])));
    }

    #[test]
    fn rolling_hash_matches_known_value() {
        // "abc" => ((97 * 31) + 98) * 31 + 99
        assert_eq!(rolling_hash("abc"), 96_354);
        assert_eq!(workbook_key("abc", None), "wb-00017862");
    }
}
