use std::path::PathBuf;

use anyhow::Result;

use crate::infra::cache::EmbeddedLimits;
use crate::platform::paths::AppPaths;
use crate::usecase::ports::origin::Credentials;
use crate::usecase::services::orchestrator::SessionConfig;
use crate::usecase::services::prefetch::PrefetchConfig;

pub const ACCESS_TOKEN_ENV: &str = "SHEETDECK_ACCESS_TOKEN";
pub const CACHE_DIR_ENV: &str = "SHEETDECK_CACHE_DIR";

/// Application settings, built once in `main` and handed down by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub interactive_chunk_rows: usize,
    pub prefetch: PrefetchConfig,
    pub max_embedded_payload_bytes: usize,
    pub max_embedded_blob_bytes: usize,
    pub credentials: Option<Credentials>,
}

impl AppConfig {
    pub fn with_paths(paths: AppPaths) -> Self {
        let limits = EmbeddedLimits::default();
        Self {
            data_dir: paths.data_dir,
            cache_dir: paths.cache_dir,
            interactive_chunk_rows: 5_000,
            prefetch: PrefetchConfig::default(),
            max_embedded_payload_bytes: limits.max_payload_bytes,
            max_embedded_blob_bytes: limits.max_blob_bytes,
            credentials: None,
        }
    }

    /// Defaults from the platform directories, overridden by the environment.
    pub fn from_env() -> Result<Self> {
        let config = Self::with_paths(AppPaths::resolve()?);
        Ok(config.with_overrides(
            std::env::var(ACCESS_TOKEN_ENV).ok(),
            std::env::var(CACHE_DIR_ENV).ok(),
        ))
    }

    fn with_overrides(mut self, access_token: Option<String>, cache_dir: Option<String>) -> Self {
        if let Some(access_token) = access_token.filter(|token| !token.trim().is_empty()) {
            self.credentials = Some(Credentials { access_token });
        }
        if let Some(cache_dir) = cache_dir.filter(|dir| !dir.trim().is_empty()) {
            self.cache_dir = PathBuf::from(cache_dir);
        }
        self
    }

    pub fn db_path(&self) -> PathBuf {
        AppPaths {
            data_dir: self.data_dir.clone(),
            cache_dir: self.cache_dir.clone(),
        }
        .db_path()
    }

    pub fn embedded_limits(&self) -> EmbeddedLimits {
        EmbeddedLimits {
            max_payload_bytes: self.max_embedded_payload_bytes,
            max_blob_bytes: self.max_embedded_blob_bytes,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            interactive_chunk_rows: self.interactive_chunk_rows,
            prefetch: self.prefetch,
            credentials: self.credentials.clone(),
        }
    }
}
