//! Process-lifetime cleanup registry.
//!
//! The driver owns one registry and hands it to subsystems that create
//! transient artifacts (temp files from atomic writes). On abort or exit the
//! binary runs the registry; paths whose renames already landed are gone and
//! are skipped silently.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
pub struct CleanupRegistry {
    paths: Mutex<Vec<PathBuf>>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        CleanupRegistry::default()
    }

    /// Register a transient path for best-effort removal.
    pub fn register_path(&self, path: &Path) {
        self.paths.lock().unwrap().push(path.to_path_buf());
    }

    /// Remove every registered path that still exists. Errors are ignored.
    pub fn run(&self) {
        let paths = std::mem::take(&mut *self.paths.lock().unwrap());
        for path in paths {
            if path.exists() {
                debug!("removing leftover temp file {}", path.display());
                let _ = std::fs::remove_file(&path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn removes_registered_leftovers() {
        let temp = TempDir::new().unwrap();
        let stale = temp.path().join("stale.tmp");
        std::fs::write(&stale, "x").unwrap();
        let registry = CleanupRegistry::new();
        registry.register_path(&stale);
        registry.register_path(&temp.path().join("already-gone.tmp"));
        registry.run();
        assert!(!stale.exists());
    }
}
