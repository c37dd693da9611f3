use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;

const DB_FILE_NAME: &str = "sheetdeck.sqlite";

/// Where the application keeps its registry database and workbook cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl AppPaths {
    pub fn resolve() -> Result<Self> {
        let project_dirs = ProjectDirs::from("com", "sheetdeck", "sheetdeck")
            .ok_or_else(|| anyhow!("unable to resolve data directory"))?;
        Ok(Self {
            data_dir: project_dirs.data_local_dir().to_path_buf(),
            cache_dir: project_dirs.cache_dir().join("workbooks"),
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn webview_data_dir(&self) -> Result<PathBuf> {
        ensure_webview_data_dir(&self.data_dir)
    }
}

fn ensure_webview_data_dir(base_data_dir: &Path) -> Result<PathBuf> {
    let webview_data_dir = base_data_dir.join("webview");
    std::fs::create_dir_all(&webview_data_dir).with_context(|| {
        format!(
            "failed to create webview dir: {}",
            webview_data_dir.display()
        )
    })?;
    Ok(webview_data_dir)
}
