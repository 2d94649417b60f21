//! Filesystem helpers shared by the store, cache, and driver.

use std::path::{Path, PathBuf};

use crate::cleanup::CleanupRegistry;

/// Write a file atomically: write to a temp sibling, then rename over the
/// target. A cancelled or crashed build never leaves a partial file behind;
/// the temp path is registered for cleanup until the rename lands.
pub fn write_atomic(
    path: &Path,
    contents: &[u8],
    cleanup: Option<&CleanupRegistry>,
) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = temp_sibling(path);
    if let Some(registry) = cleanup {
        registry.register_path(&tmp);
    }
    std::fs::write(&tmp, contents)?;
    let result = std::fs::rename(&tmp, path);
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Remove every entry inside `dir`, keeping the directory itself.
pub fn empty_dir(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}
