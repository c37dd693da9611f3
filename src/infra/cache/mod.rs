//! Persistent cache backends and the one-time choice between them.

pub mod fs_store;
pub mod sqlite_store;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::platform::capability::RuntimeCapabilities;
use crate::usecase::ports::cache_backend::PersistentCacheBackend;

pub use fs_store::FsCacheStore;
pub use sqlite_store::{EmbeddedLimits, SqliteCacheStore};

/// Picks the backend for this process.
///
/// Direct disk access gets the filesystem store, which holds payloads of any
/// size. Everything else falls back to the size-bounded embedded store.
pub fn select_backend(
    capabilities: RuntimeCapabilities,
    cache_dir: &Path,
    db_path: &Path,
    limits: EmbeddedLimits,
) -> Result<Arc<dyn PersistentCacheBackend>> {
    let backend: Arc<dyn PersistentCacheBackend> = if capabilities.durable_local_storage {
        Arc::new(FsCacheStore::new(cache_dir.to_path_buf()))
    } else {
        Arc::new(SqliteCacheStore::open(db_path.to_path_buf(), limits)?)
    };
    tracing::info!(backend = backend.name(), "persistent cache backend selected");
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durable_storage_selects_filesystem_store() {
        let temp_dir = tempfile::tempdir().expect("should create temp dir");
        let capabilities = RuntimeCapabilities {
            durable_local_storage: true,
        };

        let backend = select_backend(
            capabilities,
            &temp_dir.path().join("cache"),
            &temp_dir.path().join("app.sqlite"),
            EmbeddedLimits::default(),
        )
        .expect("backend should be selected");

        assert_eq!(backend.name(), "filesystem");
        assert_eq!(
            backend.stats().backend_path,
            Some(temp_dir.path().join("cache"))
        );
    }

    #[test]
    fn missing_durable_storage_selects_embedded_store() {
        let temp_dir = tempfile::tempdir().expect("should create temp dir");
        let capabilities = RuntimeCapabilities {
            durable_local_storage: false,
        };

        let backend = select_backend(
            capabilities,
            &temp_dir.path().join("cache"),
            &temp_dir.path().join("app.sqlite"),
            EmbeddedLimits::default(),
        )
        .expect("backend should be selected");

        assert_eq!(backend.name(), "embedded");
        assert!(temp_dir.path().join("app.sqlite").exists());
    }
}
