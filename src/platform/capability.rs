use std::fs;
use std::path::Path;

/// What the current runtime can offer the persistent cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeCapabilities {
    /// A cache directory exists (or can be created) and accepts writes.
    pub durable_local_storage: bool,
}

impl RuntimeCapabilities {
    /// Probed once at startup.
    pub fn probe(cache_dir: &Path) -> Self {
        let durable_local_storage = !cfg!(target_arch = "wasm32") && can_write_to(cache_dir);
        tracing::debug!(
            cache_dir = %cache_dir.display(),
            durable_local_storage,
            "runtime capabilities probed"
        );
        Self {
            durable_local_storage,
        }
    }
}

fn can_write_to(dir: &Path) -> bool {
    if fs::create_dir_all(dir).is_err() {
        return false;
    }
    let marker = dir.join(".write-probe");
    let writable = fs::write(&marker, b"ok").is_ok();
    let _ = fs::remove_file(&marker);
    writable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writable_directory_is_durable() {
        let temp_dir = tempfile::tempdir().expect("should create temp dir");

        let capabilities = RuntimeCapabilities::probe(&temp_dir.path().join("cache"));

        assert!(capabilities.durable_local_storage);
        assert!(
            !temp_dir.path().join("cache").join(".write-probe").exists(),
            "probe should clean up after itself"
        );
    }

    #[test]
    fn path_below_a_file_is_not_durable() {
        let temp_dir = tempfile::tempdir().expect("should create temp dir");
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"file").expect("should write file");

        let capabilities = RuntimeCapabilities::probe(&blocker.join("cache"));

        assert!(!capabilities.durable_local_storage);
    }
}
