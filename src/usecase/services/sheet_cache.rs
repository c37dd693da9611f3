use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::entities::workbook::ParsedSheet;

/// Parsed selections of the active workbook, keyed by sheet key.
///
/// No TTL and no cap: the set is bounded by the workbook's sheets and is
/// wiped in full whenever the workbook is replaced.
#[derive(Debug, Default)]
pub struct ParsedSheetCache {
    entries: HashMap<String, Arc<ParsedSheet>>,
}

impl ParsedSheetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<ParsedSheet>> {
        self.entries.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn put(&mut self, key: impl Into<String>, value: Arc<ParsedSheet>) {
        self.entries.insert(key.into(), value);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
