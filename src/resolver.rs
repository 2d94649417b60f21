//! Module resolution adapter.
//!
//! The graph builder resolves import specifiers through an injected
//! [`Resolver`] over a [`ResolverHost`]; the host combines the in-memory
//! store with optional disk fallback. [`NodeResolver`] is the default
//! implementation: node-style resolution narrowed to declaration files.
//!
//! Relative specifiers try the exact path, declaration extensions, a
//! `.js` → `.d.ts` retarget, and a directory index. Bare specifiers walk
//! `node_modules` directories upward from the importing file, honoring the
//! package's `types`/`typings` manifest fields.

use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

use crate::compiler::CompilerOptions;

pub trait ResolverHost {
    fn file_exists(&self, path: &Path) -> bool;
    fn read_file(&self, path: &Path) -> Option<String>;
    fn directory_exists(&self, path: &Path) -> bool;
    fn get_current_directory(&self) -> PathBuf;
    fn get_directories(&self, path: &Path) -> Vec<PathBuf>;
}

/// `Sync` because one resolver is shared across parallel bundling tasks.
pub trait Resolver: Sync {
    fn resolve_module_name(
        &self,
        specifier: &str,
        containing_file: &Path,
        options: &CompilerOptions,
        host: &dyn ResolverHost,
    ) -> Option<PathBuf>;
}

/// Lexical path normalization: strips `.` and folds `..` without touching
/// the filesystem, so store keys stay comparable.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True when the path has a `node_modules` component.
pub fn is_in_node_modules(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str() == "node_modules")
}

pub fn is_declaration_file(path: &Path) -> bool {
    let name = path.to_string_lossy();
    name.ends_with(".d.ts") || name.ends_with(".d.tsx")
}

#[derive(Debug, Deserialize)]
struct PackageManifest {
    types: Option<String>,
    typings: Option<String>,
}

/// Node-style declaration resolution.
#[derive(Debug, Default)]
pub struct NodeResolver;

impl Resolver for NodeResolver {
    fn resolve_module_name(
        &self,
        specifier: &str,
        containing_file: &Path,
        _options: &CompilerOptions,
        host: &dyn ResolverHost,
    ) -> Option<PathBuf> {
        if specifier.starts_with("./") || specifier.starts_with("../") {
            let base = containing_file.parent().unwrap_or(Path::new("."));
            return resolve_file(&normalize_path(&base.join(specifier)), host);
        }
        if Path::new(specifier).is_absolute() {
            return resolve_file(&normalize_path(Path::new(specifier)), host);
        }
        resolve_bare(specifier, containing_file, host)
    }
}

/// File-level candidates for a resolved path stem.
fn resolve_file(path: &Path, host: &dyn ResolverHost) -> Option<PathBuf> {
    if is_declaration_file(path) && host.file_exists(path) {
        return Some(path.to_path_buf());
    }
    let text = path.to_string_lossy();
    let with_ext = PathBuf::from(format!("{text}.d.ts"));
    if host.file_exists(&with_ext) {
        return Some(with_ext);
    }
    // ESM-style `./x.js` points at the emitted JavaScript; its declaration
    // sits next to it.
    for js_ext in [".js", ".jsx", ".mjs", ".cjs"] {
        if let Some(stem) = text.strip_suffix(js_ext) {
            let dts = PathBuf::from(format!("{stem}.d.ts"));
            if host.file_exists(&dts) {
                return Some(dts);
            }
        }
    }
    let index = path.join("index.d.ts");
    if host.directory_exists(path) && host.file_exists(&index) {
        return Some(index);
    }
    None
}

/// Walk `node_modules` directories upward from the importing file.
fn resolve_bare(specifier: &str, containing_file: &Path, host: &dyn ResolverHost) -> Option<PathBuf> {
    let (package, subpath) = split_package_specifier(specifier);
    let mut dir = containing_file.parent();
    while let Some(current) = dir {
        let package_dir = current.join("node_modules").join(package);
        if host.directory_exists(&package_dir) {
            if let Some(resolved) = resolve_package(&package_dir, subpath, host) {
                return Some(resolved);
            }
        }
        dir = current.parent();
    }
    None
}

/// `@scope/pkg/deep` splits into `@scope/pkg` and `deep`.
fn split_package_specifier(specifier: &str) -> (&str, Option<&str>) {
    let segments: Vec<&str> = specifier.splitn(3, '/').collect();
    if specifier.starts_with('@') {
        match segments.len() {
            0 | 1 | 2 => (specifier, None),
            _ => {
                let package_len = segments[0].len() + 1 + segments[1].len();
                (&specifier[..package_len], Some(&specifier[package_len + 1..]))
            }
        }
    } else {
        match specifier.split_once('/') {
            Some((package, rest)) => (package, Some(rest)),
            None => (specifier, None),
        }
    }
}

fn resolve_package(
    package_dir: &Path,
    subpath: Option<&str>,
    host: &dyn ResolverHost,
) -> Option<PathBuf> {
    if let Some(subpath) = subpath {
        return resolve_file(&normalize_path(&package_dir.join(subpath)), host);
    }
    if let Some(manifest_text) = host.read_file(&package_dir.join("package.json")) {
        if let Ok(manifest) = serde_json::from_str::<PackageManifest>(&manifest_text) {
            if let Some(types) = manifest.types.or(manifest.typings) {
                if let Some(resolved) =
                    resolve_file(&normalize_path(&package_dir.join(types)), host)
                {
                    return Some(resolved);
                }
            }
        }
    }
    let index = package_dir.join("index.d.ts");
    if host.file_exists(&index) {
        return Some(index);
    }
    None
}

/// Host over the real filesystem.
#[derive(Debug, Default)]
pub struct DiskHost;

impl ResolverHost for DiskHost {
    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_file(&self, path: &Path) -> Option<String> {
        std::fs::read_to_string(path).ok()
    }

    fn directory_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn get_current_directory(&self) -> PathBuf {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    fn get_directories(&self, path: &Path) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(path) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.path())
            .collect()
    }
}
