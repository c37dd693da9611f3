use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::usecase::ports::cache_backend::{
    BackendStats, CacheEntry, CacheListing, PersistentCacheBackend,
};

const ENTRY_EXTENSION: &str = "json";

/// One JSON file per cache key under a local directory.
///
/// Used when the runtime has direct disk access; payloads are stored in full,
/// pre-parsed sheet included, whatever their size.
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let file_stem: String = key
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
            .collect();
        self.root.join(format!("{file_stem}.{ENTRY_EXTENSION}"))
    }

    fn try_save(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create cache dir: {}", self.root.display()))?;

        let payload = serde_json::to_vec(entry).context("failed to encode cache entry")?;
        let path = self.entry_path(key);
        let staging = path.with_extension("tmp");
        fs::write(&staging, payload)
            .with_context(|| format!("failed to write cache entry: {}", staging.display()))?;
        fs::rename(&staging, &path)
            .with_context(|| format!("failed to move cache entry into place: {}", path.display()))?;
        Ok(())
    }

    fn try_load(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(key);
        let payload = match fs::read(&path) {
            Ok(payload) => payload,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read cache entry: {}", path.display()))
            }
        };
        let entry = serde_json::from_slice(&payload)
            .with_context(|| format!("failed to decode cache entry: {}", path.display()))?;
        Ok(Some(entry))
    }

    fn try_list(&self) -> Result<Vec<CacheListing>> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read cache dir: {}", self.root.display()))
            }
        };

        let mut listing = Vec::new();
        for item in dir {
            let item = item.context("failed to read cache dir entry")?;
            let path = item.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let metadata = item
                .metadata()
                .with_context(|| format!("failed to stat cache entry: {}", path.display()))?;
            let modified_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            listing.push(CacheListing {
                key: key.to_string(),
                size: metadata.len(),
                modified_at,
                loadable: true,
            });
        }
        listing.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(listing)
    }
}

impl PersistentCacheBackend for FsCacheStore {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn save(&self, key: &str, entry: &CacheEntry) -> bool {
        match self.try_save(key, entry) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(key = %key, error = %format!("{err:#}"), "filesystem cache write failed");
                false
            }
        }
    }

    fn load(&self, key: &str) -> Option<CacheEntry> {
        self.try_load(key).unwrap_or_else(|err| {
            tracing::warn!(key = %key, error = %format!("{err:#}"), "filesystem cache read failed");
            None
        })
    }

    fn remove(&self, key: &str) -> bool {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => true,
            Err(err) if err.kind() == ErrorKind::NotFound => true,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "filesystem cache remove failed");
                false
            }
        }
    }

    fn list(&self) -> Vec<CacheListing> {
        self.try_list().unwrap_or_else(|err| {
            tracing::warn!(error = %format!("{err:#}"), "filesystem cache listing failed");
            Vec::new()
        })
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            total_size: self.list().iter().map(|item| item.size).sum(),
            backend_path: Some(self.root.clone()),
        }
    }
}
