use std::path::PathBuf;

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use crate::infra::sqlite::queries::{format_timestamp, parse_timestamp};
use crate::infra::sqlite::schema::{init_db, open_connection};
use crate::usecase::ports::cache_backend::{
    BackendStats, CacheEntry, CacheListing, PersistentCacheBackend,
};

/// Size bounds for payloads kept inside the embedded database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedLimits {
    /// Above this the pre-parsed sheet is dropped and the entry flagged for re-parse.
    pub max_payload_bytes: usize,
    /// Above this only the metadata row is kept.
    pub max_blob_bytes: usize,
}

impl Default for EmbeddedLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: 4 * 1024 * 1024,
            max_blob_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Cache entries stored in the application database.
///
/// This is the fallback for runtimes without direct, durable disk access to a
/// cache directory. Blobs live in `cache_blob`; `cache_meta` always gets a row,
/// even when the blob itself was too large to keep.
pub struct SqliteCacheStore {
    db_path: PathBuf,
    limits: EmbeddedLimits,
}

enum Stored {
    Full,
    WithoutParsed,
    MetadataOnly,
}

impl SqliteCacheStore {
    pub fn open(db_path: PathBuf, limits: EmbeddedLimits) -> Result<Self> {
        init_db(&db_path)?;
        Ok(Self { db_path, limits })
    }

    fn try_save(&self, key: &str, entry: &CacheEntry) -> Result<Stored> {
        let mut payload = serde_json::to_vec(entry).context("failed to encode cache entry")?;
        let mut stored = Stored::Full;

        if payload.len() > self.limits.max_payload_bytes && entry.parsed_data.is_some() {
            let trimmed = entry.clone().without_parsed();
            payload = serde_json::to_vec(&trimmed).context("failed to encode trimmed cache entry")?;
            stored = Stored::WithoutParsed;
        }
        if payload.len() > self.limits.max_blob_bytes {
            stored = Stored::MetadataOnly;
        }

        let mut conn = open_connection(&self.db_path)?;
        let tx = conn
            .transaction()
            .context("failed to start cache write transaction")?;

        match stored {
            Stored::MetadataOnly => {
                tx.execute("DELETE FROM cache_blob WHERE cache_key = ?1", [key])
                    .context("failed to clear oversized cache blob")?;
            }
            Stored::Full | Stored::WithoutParsed => {
                tx.execute(
                    "INSERT INTO cache_blob(cache_key, payload) VALUES (?1, ?2)
                     ON CONFLICT(cache_key) DO UPDATE SET payload = excluded.payload",
                    params![key, payload],
                )
                .context("failed to write cache blob")?;
            }
        }

        let has_blob = !matches!(stored, Stored::MetadataOnly);
        tx.execute(
            "INSERT INTO cache_meta(
                cache_key, file_name, active_sheet_name, last_refreshed_at,
                cached_at, size, has_blob, modified_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(cache_key) DO UPDATE SET
                file_name = excluded.file_name,
                active_sheet_name = excluded.active_sheet_name,
                last_refreshed_at = excluded.last_refreshed_at,
                cached_at = excluded.cached_at,
                size = excluded.size,
                has_blob = excluded.has_blob,
                modified_at = excluded.modified_at",
            params![
                key,
                entry.file_name,
                entry.active_sheet_name,
                format_timestamp(entry.last_refreshed_at),
                format_timestamp(entry.cached_at),
                payload.len() as i64,
                i64::from(has_blob),
                format_timestamp(chrono::Utc::now()),
            ],
        )
        .context("failed to write cache metadata")?;

        tx.commit().context("failed to commit cache write")?;
        Ok(stored)
    }

    fn try_load(&self, key: &str) -> Result<Option<CacheEntry>> {
        let conn = open_connection(&self.db_path)?;
        let payload: Option<Vec<u8>> = conn
            .query_row(
                "SELECT payload FROM cache_blob WHERE cache_key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query cache blob")?;

        payload
            .map(|payload| {
                serde_json::from_slice(&payload)
                    .with_context(|| format!("failed to decode cache entry: {key}"))
            })
            .transpose()
    }

    fn try_remove(&self, key: &str) -> Result<()> {
        let mut conn = open_connection(&self.db_path)?;
        let tx = conn
            .transaction()
            .context("failed to start cache remove transaction")?;
        tx.execute("DELETE FROM cache_blob WHERE cache_key = ?1", [key])
            .context("failed to delete cache blob")?;
        tx.execute("DELETE FROM cache_meta WHERE cache_key = ?1", [key])
            .context("failed to delete cache metadata")?;
        tx.commit().context("failed to commit cache remove")?;
        Ok(())
    }

    fn try_list(&self) -> Result<Vec<CacheListing>> {
        let conn = open_connection(&self.db_path)?;
        let mut stmt = conn
            .prepare(
                "SELECT cache_key, size, modified_at, has_blob
                 FROM cache_meta
                 ORDER BY cache_key",
            )
            .context("failed to prepare cache listing query")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .context("failed to query cache listing")?;

        let mut listing = Vec::new();
        for row in rows {
            let (key, size, modified_at, has_blob) =
                row.context("failed to read cache listing row")?;
            listing.push(CacheListing {
                key,
                size: u64::try_from(size).unwrap_or_default(),
                modified_at: parse_timestamp(&modified_at)?,
                loadable: has_blob != 0,
            });
        }
        Ok(listing)
    }
}

impl PersistentCacheBackend for SqliteCacheStore {
    fn name(&self) -> &'static str {
        "embedded"
    }

    fn save(&self, key: &str, entry: &CacheEntry) -> bool {
        match self.try_save(key, entry) {
            Ok(Stored::Full) => true,
            Ok(Stored::WithoutParsed) => {
                tracing::debug!(key = %key, "pre-parsed sheet too large for embedded cache; dropped");
                true
            }
            Ok(Stored::MetadataOnly) => {
                tracing::warn!(key = %key, "workbook too large for embedded cache; kept metadata only");
                false
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %format!("{err:#}"), "embedded cache write failed");
                false
            }
        }
    }

    fn load(&self, key: &str) -> Option<CacheEntry> {
        self.try_load(key).unwrap_or_else(|err| {
            tracing::warn!(key = %key, error = %format!("{err:#}"), "embedded cache read failed");
            None
        })
    }

    fn remove(&self, key: &str) -> bool {
        match self.try_remove(key) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(key = %key, error = %format!("{err:#}"), "embedded cache remove failed");
                false
            }
        }
    }

    fn list(&self) -> Vec<CacheListing> {
        self.try_list().unwrap_or_else(|err| {
            tracing::warn!(error = %format!("{err:#}"), "embedded cache listing failed");
            Vec::new()
        })
    }

    /// Sizes of metadata-only rows are what the payload would have been, so
    /// they are left out of the total.
    fn stats(&self) -> BackendStats {
        BackendStats {
            total_size: self
                .list()
                .iter()
                .filter(|item| item.loadable)
                .map(|item| item.size)
                .sum(),
            backend_path: Some(self.db_path.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::workbook::{ParsedSheet, RawSheet, Scalar, Workbook};

    fn entry_with_rows(rows: usize) -> CacheEntry {
        let mut raw = vec![vec![Scalar::from("Part"), Scalar::from("Qty")]];
        let mut parsed_rows = Vec::new();
        for idx in 0..rows {
            raw.push(vec![Scalar::from(format!("part-{idx}").as_str()), Scalar::Number(idx as f64)]);
            parsed_rows.push(
                [
                    ("Part".to_string(), Scalar::from(format!("part-{idx}").as_str())),
                    ("Qty".to_string(), Scalar::Number(idx as f64)),
                ]
                .into_iter()
                .collect(),
            );
        }
        let parsed = ParsedSheet {
            columns: vec!["Part".to_string(), "Qty".to_string()],
            rows: parsed_rows,
        };
        CacheEntry::new(Workbook::new(vec![RawSheet::new("Parts", raw)]), "parts.xlsx", "Parts")
            .with_parsed("single:Parts", parsed)
    }

    fn open_store(dir: &tempfile::TempDir, limits: EmbeddedLimits) -> SqliteCacheStore {
        SqliteCacheStore::open(dir.path().join("app.sqlite"), limits)
            .expect("store should open")
    }

    #[test]
    fn save_then_load_in_fresh_store_round_trips() {
        let temp_dir = tempfile::tempdir().expect("should create temp dir");
        let entry = entry_with_rows(3);

        assert!(open_store(&temp_dir, EmbeddedLimits::default()).save("wb-0001", &entry));
        let loaded = open_store(&temp_dir, EmbeddedLimits::default())
            .load("wb-0001")
            .expect("entry should exist");

        assert_eq!(loaded.workbook, entry.workbook);
        assert_eq!(loaded.file_name, entry.file_name);
        assert_eq!(loaded.active_sheet_name, entry.active_sheet_name);
        assert_eq!(loaded.parsed_data, entry.parsed_data);
        assert!(!loaded.needs_reparse);
    }

    #[test]
    fn oversized_parse_is_dropped_and_flagged() {
        let temp_dir = tempfile::tempdir().expect("should create temp dir");
        let limits = EmbeddedLimits {
            max_payload_bytes: 256,
            max_blob_bytes: 1024 * 1024,
        };
        let entry = entry_with_rows(50);

        assert!(open_store(&temp_dir, limits).save("wb-big", &entry));
        let loaded = open_store(&temp_dir, limits)
            .load("wb-big")
            .expect("workbook should still be stored");

        assert_eq!(loaded.workbook, entry.workbook);
        assert!(loaded.parsed_data.is_none(), "parse should be dropped");
        assert!(loaded.parsed_cache_key.is_none());
        assert!(loaded.needs_reparse, "entry should ask for a re-parse");
    }

    #[test]
    fn oversized_blob_keeps_metadata_only() {
        let temp_dir = tempfile::tempdir().expect("should create temp dir");
        let limits = EmbeddedLimits {
            max_payload_bytes: 64,
            max_blob_bytes: 128,
        };
        let store = open_store(&temp_dir, limits);

        assert!(!store.save("wb-huge", &entry_with_rows(50)));
        assert!(store.load("wb-huge").is_none());

        let listing = store.list();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].key, "wb-huge");
        assert!(!listing[0].loadable, "metadata-only row cannot be loaded");
        assert_eq!(store.stats().total_size, 0);
    }

    #[test]
    fn stats_count_only_loadable_payloads() {
        let temp_dir = tempfile::tempdir().expect("should create temp dir");
        let limits = EmbeddedLimits {
            max_payload_bytes: 64,
            max_blob_bytes: 4096,
        };
        let store = open_store(&temp_dir, limits);
        let small = CacheEntry::new(
            Workbook::new(vec![RawSheet::new("One", vec![vec![Scalar::from("x")]])]),
            "one.csv",
            "One",
        );
        assert!(store.save("wb-small", &small));
        assert!(!store.save("wb-huge", &entry_with_rows(500)));

        let listing = store.list();
        let small_size = listing
            .iter()
            .find(|item| item.key == "wb-small")
            .map(|item| item.size)
            .expect("small entry should be listed");

        assert_eq!(listing.iter().filter(|item| item.loadable).count(), 1);
        assert_eq!(store.stats().total_size, small_size);
    }

    #[test]
    fn save_replaces_existing_entry_in_full() {
        let temp_dir = tempfile::tempdir().expect("should create temp dir");
        let store = open_store(&temp_dir, EmbeddedLimits::default());
        store.save("wb-a", &entry_with_rows(2));
        let replacement = CacheEntry::new(
            Workbook::new(vec![RawSheet::new("Other", vec![vec![Scalar::from("x")]])]),
            "other.csv",
            "Other",
        );

        assert!(store.save("wb-a", &replacement));
        let loaded = store.load("wb-a").expect("entry should exist");

        assert_eq!(loaded, replacement);
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn remove_clears_blob_and_metadata() {
        let temp_dir = tempfile::tempdir().expect("should create temp dir");
        let store = open_store(&temp_dir, EmbeddedLimits::default());
        store.save("wb-a", &entry_with_rows(2));

        assert!(store.remove("wb-a"));

        assert!(store.load("wb-a").is_none());
        assert!(store.list().is_empty());
        assert_eq!(store.stats().total_size, 0);
    }
}
