//! In-memory declaration store.
//!
//! Captures the compiler's declaration emissions through the write callback,
//! pre-processing each file on the way in, and bridges them to the bundler
//! and the persistent cache. The build-info file is the one entry that goes
//! straight to disk.

use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::cache::DeclarationCache;
use crate::cleanup::CleanupRegistry;
use crate::compiler::DeclarationWriter;
use crate::error::BuildError;
use crate::fs::write_atomic;
use crate::processor::{self, CachedDeclaration};

/// Descriptor for one declaration file written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub relative_path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Default)]
pub struct DeclarationStore {
    files: FxHashMap<PathBuf, CachedDeclaration>,
    /// Set when any file was written since the last `initialize`.
    emitted: bool,
    cache: Option<DeclarationCache>,
}

impl DeclarationStore {
    pub fn new(cache: Option<DeclarationCache>) -> Self {
        DeclarationStore {
            files: FxHashMap::default(),
            emitted: false,
            cache,
        }
    }

    /// Clear the emitted flag and hydrate from the cache, or start empty
    /// when caching is disabled.
    pub fn initialize(&mut self) {
        self.emitted = false;
        match &self.cache {
            Some(cache) => cache.restore(&mut self.files),
            None => self.files.clear(),
        }
    }

    /// Persist to the cache if anything was emitted. Returns whether
    /// downstream work is needed: `false` means the build was an incremental
    /// no-op.
    pub fn finalize(&mut self) -> bool {
        match &self.cache {
            Some(cache) => {
                if self.emitted {
                    if let Err(err) = cache.save(&self.files) {
                        warn!("failed to persist declaration cache: {err}");
                    }
                    true
                } else {
                    false
                }
            }
            None => true,
        }
    }

    pub fn declaration_files(&self) -> &FxHashMap<PathBuf, CachedDeclaration> {
        &self.files
    }

    pub fn get(&self, path: &Path) -> Option<&CachedDeclaration> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// Insert a declaration loaded outside compiler emission (lazy
    /// node_modules loading). Does not mark the store as emitted.
    pub fn insert(&mut self, path: PathBuf, decl: CachedDeclaration) {
        self.files.insert(path, decl);
    }

    /// Write every stored entry to its path on disk.
    pub fn write_files(
        &self,
        project_dir: &Path,
        cleanup: Option<&CleanupRegistry>,
    ) -> Result<Vec<WrittenFile>, BuildError> {
        let mut paths: Vec<&PathBuf> = self.files.keys().collect();
        paths.sort();
        let mut written = Vec::with_capacity(paths.len());
        for path in paths {
            let decl = &self.files[path.as_path()];
            write_atomic(path, decl.code.as_bytes(), cleanup)
                .map_err(|err| BuildError::io(path, err))?;
            let relative_path = path
                .strip_prefix(project_dir)
                .unwrap_or(path)
                .to_path_buf();
            debug!("wrote {} ({} bytes)", relative_path.display(), decl.code.len());
            written.push(WrittenFile {
                relative_path,
                size: decl.code.len() as u64,
            });
        }
        Ok(written)
    }

    /// Select the entry points to bundle. With no selection, `index` wins if
    /// present, otherwise every entry; an explicit selection keeps the listed
    /// names and silently skips unknown ones.
    pub fn resolve_entry_points(
        all_entry_points: &BTreeMap<String, PathBuf>,
        selected: Option<&[String]>,
    ) -> BTreeMap<String, PathBuf> {
        match selected {
            None => {
                if let Some(index) = all_entry_points.get("index") {
                    BTreeMap::from([("index".to_string(), index.clone())])
                } else {
                    all_entry_points.clone()
                }
            }
            Some(names) => all_entry_points
                .iter()
                .filter(|(name, _)| names.iter().any(|n| n == *name))
                .map(|(name, path)| (name.clone(), path.clone()))
                .collect(),
        }
    }

    pub fn close(&mut self) {
        self.files.clear();
    }
}

impl DeclarationWriter for DeclarationStore {
    /// The write callback handed to the compiler. Build-info passes through
    /// to disk; declarations are pre-processed into memory. Either way the
    /// emitted flag is set.
    fn write_file(&mut self, path: &Path, text: &str) -> Result<(), BuildError> {
        if let Some(cache) = &self.cache {
            if cache.is_build_info_file(path) {
                write_atomic(path, text.as_bytes(), None)
                    .map_err(|err| BuildError::io(path, err))?;
                self.emitted = true;
                return Ok(());
            }
        }
        let decl = processor::pre_process(text)?;
        self.files.insert(path.to_path_buf(), decl);
        self.emitted = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(store: &mut DeclarationStore, path: &str, text: &str) {
        store.write_file(Path::new(path), text).unwrap();
    }

    #[test]
    fn write_callback_preprocesses_into_memory() {
        let mut store = DeclarationStore::new(None);
        store.initialize();
        write(&mut store, "/p/dist/a.d.ts", "export declare const a: number;\n");
        let decl = store.get(Path::new("/p/dist/a.d.ts")).unwrap();
        assert!(decl.code.contains("declare const a: number;"));
        assert!(decl.code.contains("export { a };"));
    }

    #[test]
    fn finalize_without_cache_always_proceeds() {
        let mut store = DeclarationStore::new(None);
        store.initialize();
        assert!(store.finalize());
    }

    #[test]
    fn finalize_gates_on_emission_when_caching() {
        let temp = TempDir::new().unwrap();
        let cache = DeclarationCache::new(temp.path(), temp.path().join(".tsbuildinfo"));
        let mut store = DeclarationStore::new(Some(cache));
        store.initialize();
        assert!(!store.finalize(), "no emission means incremental no-op");

        write(&mut store, "/p/dist/a.d.ts", "export declare const a: number;\n");
        assert!(store.finalize());

        // A fresh initialize clears the flag again.
        store.initialize();
        assert!(!store.finalize());
    }

    #[test]
    fn cache_roundtrip_through_initialize() {
        let temp = TempDir::new().unwrap();
        let build_info = temp.path().join(".tsbuildinfo");
        {
            let cache = DeclarationCache::new(temp.path(), build_info.clone());
            let mut store = DeclarationStore::new(Some(cache));
            store.initialize();
            write(&mut store, "/p/dist/a.d.ts", "export interface A {}\n");
            assert!(store.finalize());
        }
        let cache = DeclarationCache::new(temp.path(), build_info);
        let mut store = DeclarationStore::new(Some(cache));
        store.initialize();
        assert!(store.contains(Path::new("/p/dist/a.d.ts")));
    }

    #[test]
    fn build_info_goes_to_disk() {
        let temp = TempDir::new().unwrap();
        let build_info = temp.path().join("dist/.tsbuildinfo");
        let cache = DeclarationCache::new(temp.path(), build_info.clone());
        let mut store = DeclarationStore::new(Some(cache));
        store.initialize();
        store
            .write_file(&build_info, "{\"fileNames\":[]}")
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&build_info).unwrap(),
            "{\"fileNames\":[]}"
        );
        assert!(!store.contains(&build_info));
        assert!(store.finalize(), "build-info write still counts as emission");
    }

    #[test]
    fn write_files_reports_descriptors() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("dist/index.d.ts");
        let mut store = DeclarationStore::new(None);
        store.initialize();
        write(
            &mut store,
            out.to_str().unwrap(),
            "export declare const a: number;\n",
        );
        let written = store.write_files(temp.path(), None).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].relative_path, PathBuf::from("dist/index.d.ts"));
        assert_eq!(
            written[0].size,
            std::fs::metadata(&out).unwrap().len()
        );
    }

    #[test]
    fn entry_point_selection() {
        let all = BTreeMap::from([
            ("index".to_string(), PathBuf::from("/p/src/index.ts")),
            ("cli".to_string(), PathBuf::from("/p/src/cli.ts")),
        ]);
        // Default keeps only `index` when present.
        let picked = DeclarationStore::resolve_entry_points(&all, None);
        assert_eq!(picked.len(), 1);
        assert!(picked.contains_key("index"));

        // Without an `index` entry everything is kept.
        let no_index = BTreeMap::from([("cli".to_string(), PathBuf::from("/p/src/cli.ts"))]);
        let picked = DeclarationStore::resolve_entry_points(&no_index, None);
        assert_eq!(picked.len(), 1);
        assert!(picked.contains_key("cli"));

        // Explicit selection skips unknown names silently.
        let picked = DeclarationStore::resolve_entry_points(
            &all,
            Some(&["cli".to_string(), "missing".to_string()]),
        );
        assert_eq!(picked.len(), 1);
        assert!(picked.contains_key("cli"));
    }

    #[test]
    fn close_clears_memory() {
        let mut store = DeclarationStore::new(None);
        store.initialize();
        write(&mut store, "/p/dist/a.d.ts", "export interface A {}\n");
        store.close();
        assert!(store.declaration_files().is_empty());
    }
}
