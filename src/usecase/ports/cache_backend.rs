use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::workbook::{ParsedSheet, Workbook};

/// One persisted workbook plus enough metadata to render without a network call,
/// and in the best case without re-parsing the active sheet either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub workbook: Workbook,
    pub file_name: String,
    pub active_sheet_name: String,
    pub last_refreshed_at: DateTime<Utc>,
    pub cached_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_data: Option<ParsedSheet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_cache_key: Option<String>,
    /// Set when a size-bounded backend dropped `parsed_data` on the way in.
    #[serde(default)]
    pub needs_reparse: bool,
}

impl CacheEntry {
    pub fn new(workbook: Workbook, file_name: impl Into<String>, active_sheet_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            workbook,
            file_name: file_name.into(),
            active_sheet_name: active_sheet_name.into(),
            last_refreshed_at: now,
            cached_at: now,
            parsed_data: None,
            parsed_cache_key: None,
            needs_reparse: false,
        }
    }

    pub fn with_parsed(mut self, key: impl Into<String>, parsed: ParsedSheet) -> Self {
        self.parsed_cache_key = Some(key.into());
        self.parsed_data = Some(parsed);
        self.needs_reparse = false;
        self
    }

    /// Drops the pre-parsed sheet and flags the entry so the next load re-parses.
    pub fn without_parsed(mut self) -> Self {
        if self.parsed_data.is_some() {
            self.parsed_data = None;
            self.parsed_cache_key = None;
            self.needs_reparse = true;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheListing {
    pub key: String,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    /// `false` for metadata-only rows whose payload was too large to keep;
    /// `load` never returns those.
    pub loadable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub total_size: u64,
    pub backend_path: Option<PathBuf>,
}

/// Durable key -> blob store.
///
/// Writes are best-effort: implementations log failures and report them as
/// `false` rather than raising, because the in-process state stays correct
/// and only durability is lost. Read failures surface as "absent".
pub trait PersistentCacheBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn save(&self, key: &str, entry: &CacheEntry) -> bool;
    fn load(&self, key: &str) -> Option<CacheEntry>;
    fn remove(&self, key: &str) -> bool;
    fn list(&self) -> Vec<CacheListing>;
    fn stats(&self) -> BackendStats;
}
