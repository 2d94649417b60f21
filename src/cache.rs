//! Persistent declaration cache.
//!
//! Pre-processed declarations are persisted between runs as a versioned
//! payload, serialized to JSON and gzip-compressed. The encoding is internal;
//! only [`CACHE_VERSION`] is a compatibility contract. A cache whose version
//! field is missing or unequal is treated as absent, as is any unreadable or
//! corrupted file — restore never fails the build.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::fs::write_atomic;
use crate::processor::CachedDeclaration;

/// Bumped whenever the pre-processed form or the payload layout changes.
pub const CACHE_VERSION: u32 = 2;

/// Directory under the project root reserved for this subsystem.
pub const CACHE_DIR_NAME: &str = ".tsbundle";

const CACHE_FILE_NAME: &str = "declarations.bin";

#[derive(Debug, Serialize, Deserialize)]
struct CachePayload {
    version: u32,
    /// Keyed by path string; BTreeMap keeps the serialized form stable.
    files: BTreeMap<String, CachedDeclaration>,
}

/// One instance per project per build. The payload is read eagerly at
/// construction; `restore` applies it.
#[derive(Debug)]
pub struct DeclarationCache {
    cache_dir: PathBuf,
    cache_file: PathBuf,
    build_info_path: PathBuf,
    loaded: Option<CachePayload>,
}

impl DeclarationCache {
    pub fn new(project_dir: &Path, build_info_path: PathBuf) -> Self {
        let cache_dir = project_dir.join(CACHE_DIR_NAME);
        let cache_file = cache_dir.join(CACHE_FILE_NAME);
        let loaded = read_payload(&cache_file);
        DeclarationCache {
            cache_dir,
            cache_file,
            build_info_path,
            loaded,
        }
    }

    /// Replace `target` with the cached files. A missing or rejected cache
    /// leaves the target empty.
    pub fn restore(&self, target: &mut FxHashMap<PathBuf, CachedDeclaration>) {
        target.clear();
        if let Some(payload) = &self.loaded {
            for (path, decl) in &payload.files {
                target.insert(PathBuf::from(path), decl.clone());
            }
        }
    }

    /// Atomically persist the store contents.
    pub fn save(&self, files: &FxHashMap<PathBuf, CachedDeclaration>) -> std::io::Result<()> {
        let payload = CachePayload {
            version: CACHE_VERSION,
            files: files
                .iter()
                .map(|(path, decl)| (path.to_string_lossy().into_owned(), decl.clone()))
                .collect(),
        };
        let json = serde_json::to_vec(&payload).map_err(std::io::Error::other)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        let bytes = encoder.finish()?;
        write_atomic(&self.cache_file, &bytes, None)
    }

    /// Best-effort removal of the cache directory.
    pub fn invalidate(&self) {
        let _ = std::fs::remove_dir_all(&self.cache_dir);
    }

    /// True when `path` is the compiler's build-info file, which passes
    /// through the store straight to disk.
    pub fn is_build_info_file(&self, path: &Path) -> bool {
        path == self.build_info_path
    }
}

fn read_payload(path: &Path) -> Option<CachePayload> {
    let bytes = std::fs::read(path).ok()?;
    let mut json = Vec::new();
    if GzDecoder::new(&bytes[..]).read_to_end(&mut json).is_err() {
        debug!("declaration cache at {} is corrupted", path.display());
        return None;
    }
    let payload: CachePayload = match serde_json::from_slice(&json) {
        Ok(payload) => payload,
        Err(err) => {
            debug!("declaration cache at {} failed to parse: {err}", path.display());
            return None;
        }
    };
    if payload.version != CACHE_VERSION {
        debug!(
            "declaration cache at {} has version {} (want {CACHE_VERSION})",
            path.display(),
            payload.version
        );
        return None;
    }
    Some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_files() -> FxHashMap<PathBuf, CachedDeclaration> {
        let mut files = FxHashMap::default();
        files.insert(
            PathBuf::from("/proj/dist/index.d.ts"),
            CachedDeclaration {
                code: "declare const a: number;\nexport { a };\n".into(),
                type_references: vec!["node".into()],
                file_references: vec![],
            },
        );
        files
    }

    fn cache_for(dir: &TempDir) -> DeclarationCache {
        DeclarationCache::new(dir.path(), dir.path().join("dist/.tsbuildinfo"))
    }

    #[test]
    fn save_and_restore_roundtrip() {
        let temp = TempDir::new().unwrap();
        cache_for(&temp).save(&sample_files()).unwrap();

        let reloaded = cache_for(&temp);
        let mut target = FxHashMap::default();
        target.insert(PathBuf::from("/stale"), CachedDeclaration {
            code: String::new(),
            type_references: vec![],
            file_references: vec![],
        });
        reloaded.restore(&mut target);
        assert_eq!(target.len(), 1);
        let decl = &target[&PathBuf::from("/proj/dist/index.d.ts")];
        assert!(decl.code.contains("declare const a"));
        assert_eq!(decl.type_references, vec!["node"]);
    }

    #[test]
    fn version_mismatch_restores_nothing() {
        let temp = TempDir::new().unwrap();
        let cache = cache_for(&temp);
        // Hand-write a payload with a foreign version.
        let payload = serde_json::json!({"version": CACHE_VERSION + 1, "files": {}});
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(payload.to_string().as_bytes())
            .unwrap();
        write_atomic(&cache.cache_file, &encoder.finish().unwrap(), None).unwrap();

        let reloaded = cache_for(&temp);
        let mut target = FxHashMap::default();
        reloaded.restore(&mut target);
        assert!(target.is_empty());
    }

    #[test]
    fn corrupted_cache_is_treated_as_absent() {
        let temp = TempDir::new().unwrap();
        let cache = cache_for(&temp);
        std::fs::create_dir_all(cache.cache_file.parent().unwrap()).unwrap();
        std::fs::write(&cache.cache_file, b"not gzip at all").unwrap();

        let reloaded = cache_for(&temp);
        let mut target = FxHashMap::default();
        reloaded.restore(&mut target);
        assert!(target.is_empty());
    }

    #[test]
    fn invalidate_removes_cache_dir() {
        let temp = TempDir::new().unwrap();
        let cache = cache_for(&temp);
        cache.save(&sample_files()).unwrap();
        assert!(cache.cache_file.exists());
        cache.invalidate();
        assert!(!temp.path().join(CACHE_DIR_NAME).exists());
        // Errors are swallowed on a second run.
        cache.invalidate();
    }

    #[test]
    fn build_info_path_detection() {
        let temp = TempDir::new().unwrap();
        let cache = cache_for(&temp);
        assert!(cache.is_build_info_file(&temp.path().join("dist/.tsbuildinfo")));
        assert!(!cache.is_build_info_file(&temp.path().join("dist/index.d.ts")));
    }
}
