//! Module dependency graph for declaration bundling.
//!
//! Starting from one entry declaration, builds the closure of store modules
//! reachable through import/export specifiers. Specifiers matching `external`
//! stay imports in the output; resolutions landing in `node_modules` are kept
//! external unless `noExternal` claims them, in which case their declarations
//! are lazily pre-processed into the store from disk.
//!
//! Iteration order is part of the contract: `order` records DFS discovery
//! order and each module's `imports` keeps insertion order, which makes
//! conflict renaming and emission deterministic for a given input graph.

use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::compiler::CompilerOptions;
use crate::error::BuildError;
use crate::parser::{self, SourceFile, Statement, StatementKind};
use crate::pattern::{matches_any, Pattern};
use crate::resolver::{is_in_node_modules, normalize_path, Resolver, ResolverHost};
use crate::store::DeclarationStore;

/// Top-level type-only and value-producing names declared by a module,
/// module blocks included.
#[derive(Debug, Clone, Default)]
pub struct IdentifierMap {
    pub types: FxHashSet<String>,
    pub values: FxHashSet<String>,
}

impl IdentifierMap {
    pub fn is_value(&self, name: &str) -> bool {
        self.values.contains(name)
    }

    pub fn is_type(&self, name: &str) -> bool {
        self.types.contains(name)
    }

    /// Every declared name exactly once, for conflict detection. A merged
    /// declaration (class + interface of one name) must not conflict with
    /// itself.
    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.values
            .iter()
            .chain(self.types.iter().filter(|name| !self.values.contains(*name)))
    }
}

/// One module in the graph.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub path: PathBuf,
    /// Pre-processed code.
    pub code: String,
    pub type_references: Vec<String>,
    pub file_references: Vec<String>,
    /// Parsed handle, memoized per module.
    pub file: Arc<SourceFile>,
    /// Resolved dependency paths in first-import order, deduplicated.
    pub imports: Vec<PathBuf>,
    /// Specifier string to resolved path, for import-binding tracking.
    pub resolutions: FxHashMap<String, PathBuf>,
    pub identifiers: IdentifierMap,
}

#[derive(Debug, Default)]
pub struct ModuleGraph {
    pub modules: FxHashMap<PathBuf, ModuleInfo>,
    /// DFS discovery order; the entry is first.
    pub order: Vec<PathBuf>,
    /// Per module, the specifier strings whose targets were bundled.
    pub bundled_specifiers: FxHashMap<PathBuf, Vec<String>>,
}

impl ModuleGraph {
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GraphOptions<'a> {
    pub external: &'a [Pattern],
    pub no_external: &'a [Pattern],
    /// Allow reading declarations from disk for modules outside the store.
    pub resolve: bool,
    pub project_dir: &'a Path,
    pub compiler_options: &'a CompilerOptions,
}

/// Build the module graph rooted at `entry`.
pub fn build_module_graph(
    store: &Mutex<DeclarationStore>,
    entry: &Path,
    options: &GraphOptions<'_>,
    resolver: &dyn Resolver,
) -> Result<ModuleGraph, BuildError> {
    let entry_path = normalize_entry(store, entry, options)?;
    let host = StoreHost {
        store,
        disk: options.resolve,
    };
    let mut builder = GraphBuilder {
        store,
        options,
        resolver,
        host,
        graph: ModuleGraph::default(),
    };
    builder.visit(&entry_path)?;
    Ok(builder.graph)
}

/// Translate an entry path into a store key, mapping source paths into the
/// output directory when needed.
fn normalize_entry(
    store: &Mutex<DeclarationStore>,
    entry: &Path,
    options: &GraphOptions<'_>,
) -> Result<PathBuf, BuildError> {
    let absolute = if entry.is_absolute() {
        normalize_path(entry)
    } else {
        normalize_path(&options.project_dir.join(entry))
    };
    if store.lock().unwrap().contains(&absolute) {
        return Ok(absolute);
    }

    if let Some(stem) = strip_source_extension(&absolute) {
        let root = options
            .compiler_options
            .root_dir
            .as_deref()
            .map(|r| absolutize(options.project_dir, r))
            .unwrap_or_else(|| options.project_dir.to_path_buf());
        let out_dir = options
            .compiler_options
            .out_dir
            .as_deref()
            .map(|o| absolutize(options.project_dir, o))
            .unwrap_or_else(|| options.project_dir.to_path_buf());
        let relative = stem.strip_prefix(&root).unwrap_or(&stem);
        let declaration = PathBuf::from(format!(
            "{}.d.ts",
            normalize_path(&out_dir.join(relative)).display()
        ));
        if store.lock().unwrap().contains(&declaration) {
            return Ok(declaration);
        }
    }

    Err(BuildError::Bundle(format!(
        "entry point declaration not found for {}",
        entry.display()
    )))
}

fn absolutize(project_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&project_dir.join(path))
    }
}

/// `src/index.ts` → `src/index`; declaration files are left alone.
fn strip_source_extension(path: &Path) -> Option<PathBuf> {
    let text = path.to_string_lossy();
    if text.ends_with(".d.ts") || text.ends_with(".d.tsx") {
        return None;
    }
    for ext in [".tsx", ".ts", ".mts", ".cts", ".jsx", ".js"] {
        if let Some(stem) = text.strip_suffix(ext) {
            return Some(PathBuf::from(stem));
        }
    }
    None
}

struct GraphBuilder<'a> {
    store: &'a Mutex<DeclarationStore>,
    options: &'a GraphOptions<'a>,
    resolver: &'a dyn Resolver,
    host: StoreHost<'a>,
    graph: ModuleGraph,
}

impl GraphBuilder<'_> {
    fn visit(&mut self, path: &PathBuf) -> Result<(), BuildError> {
        if self.graph.modules.contains_key(path) {
            return Ok(());
        }
        let Some(decl) = self.store.lock().unwrap().get(path).cloned() else {
            return Err(BuildError::Bundle(format!(
                "resolved module {} is missing from the declaration store",
                path.display()
            )));
        };
        let file = Arc::new(parser::parse(&decl.code));
        let identifiers = collect_identifier_map(&file.statements);
        self.graph.modules.insert(
            path.clone(),
            ModuleInfo {
                path: path.clone(),
                code: decl.code,
                type_references: decl.type_references,
                file_references: decl.file_references,
                file: file.clone(),
                imports: Vec::new(),
                resolutions: FxHashMap::default(),
                identifiers,
            },
        );
        self.graph.order.push(path.clone());

        for specifier in extract_specifiers(&file.statements) {
            if matches_any(self.options.external, &specifier) {
                continue;
            }
            let Some(resolved) = self.resolver.resolve_module_name(
                &specifier,
                path,
                self.options.compiler_options,
                &self.host,
            ) else {
                continue;
            };
            let resolved = normalize_path(&resolved);
            if is_in_node_modules(&resolved) && !matches_any(self.options.no_external, &specifier) {
                continue;
            }
            if !self.store.lock().unwrap().contains(&resolved) {
                if !self.options.resolve {
                    continue;
                }
                let Some(text) = self.host.read_file(&resolved) else {
                    continue;
                };
                let pre = crate::processor::pre_process(&text)?;
                self.store.lock().unwrap().insert(resolved.clone(), pre);
            }

            let module = self.graph.modules.get_mut(path).expect("current module");
            if !module.imports.contains(&resolved) {
                module.imports.push(resolved.clone());
            }
            module.resolutions.insert(specifier.clone(), resolved.clone());
            let bundled = self
                .graph
                .bundled_specifiers
                .entry(path.clone())
                .or_default();
            if !bundled.contains(&specifier) {
                bundled.push(specifier.clone());
            }

            self.visit(&resolved)?;
        }
        Ok(())
    }
}

/// Import/export-from specifiers in document order.
fn extract_specifiers(statements: &[Statement]) -> Vec<String> {
    let mut out = Vec::new();
    for stmt in statements {
        match &stmt.kind {
            StatementKind::Import(d) if !d.specifier.is_empty() => out.push(d.specifier.clone()),
            StatementKind::ImportEquals(d) => out.push(d.specifier.clone()),
            StatementKind::ExportNamed(d) => {
                if let Some(spec) = &d.specifier {
                    out.push(spec.clone());
                }
            }
            StatementKind::ExportStar(d) if !d.specifier.is_empty() => {
                out.push(d.specifier.clone())
            }
            _ => {}
        }
    }
    out
}

/// Collect the identifier map for a module, recursing into module blocks.
pub fn collect_identifier_map(statements: &[Statement]) -> IdentifierMap {
    let mut map = IdentifierMap::default();
    collect_into(statements, &mut map);
    map
}

fn collect_into(statements: &[Statement], map: &mut IdentifierMap) {
    for stmt in statements {
        match &stmt.kind {
            StatementKind::Interface(d) | StatementKind::TypeAlias(d) => {
                if let Some(name) = &d.name {
                    map.types.insert(name.clone());
                }
            }
            StatementKind::Class(d) | StatementKind::Function(d) | StatementKind::Enum(d) => {
                if let Some(name) = &d.name {
                    map.values.insert(name.clone());
                }
            }
            StatementKind::Variable(v) => {
                for declarator in &v.declarators {
                    map.values.insert(declarator.name.clone());
                }
            }
            StatementKind::Module(m) => {
                if !m.is_global && !m.quoted {
                    map.values.insert(m.name.clone());
                }
                collect_into(&m.statements, map);
            }
            _ => {}
        }
    }
}

/// Resolver host combining the in-memory store with optional disk fallback.
struct StoreHost<'a> {
    store: &'a Mutex<DeclarationStore>,
    disk: bool,
}

impl ResolverHost for StoreHost<'_> {
    fn file_exists(&self, path: &Path) -> bool {
        self.store.lock().unwrap().contains(path) || (self.disk && path.is_file())
    }

    fn read_file(&self, path: &Path) -> Option<String> {
        if let Some(decl) = self.store.lock().unwrap().get(path) {
            return Some(decl.code.clone());
        }
        if self.disk {
            std::fs::read_to_string(path).ok()
        } else {
            None
        }
    }

    fn directory_exists(&self, path: &Path) -> bool {
        if self
            .store
            .lock()
            .unwrap()
            .declaration_files()
            .keys()
            .any(|p| p.starts_with(path) && p != path)
        {
            return true;
        }
        self.disk && path.is_dir()
    }

    fn get_current_directory(&self) -> PathBuf {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    fn get_directories(&self, path: &Path) -> Vec<PathBuf> {
        if !self.disk {
            return Vec::new();
        }
        crate::resolver::DiskHost.get_directories(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::DeclarationWriter;
    use crate::resolver::NodeResolver;

    fn store_with(files: &[(&str, &str)]) -> Mutex<DeclarationStore> {
        let mut store = DeclarationStore::new(None);
        store.initialize();
        for (path, text) in files {
            store.write_file(Path::new(path), text).unwrap();
        }
        Mutex::new(store)
    }

    fn graph_options<'a>(
        project_dir: &'a Path,
        compiler_options: &'a CompilerOptions,
    ) -> GraphOptions<'a> {
        GraphOptions {
            external: &[],
            no_external: &[],
            resolve: false,
            project_dir,
            compiler_options,
        }
    }

    #[test]
    fn builds_closure_in_discovery_order() {
        let store = store_with(&[
            (
                "/p/dist/index.d.ts",
                "import { User } from \"./types\";\nimport { helper } from \"./util\";\nexport { User, helper };\n",
            ),
            ("/p/dist/types.d.ts", "export interface User { name: string }\n"),
            ("/p/dist/util.d.ts", "export declare function helper(): void;\n"),
        ]);
        let compiler_options = CompilerOptions::default();
        let options = graph_options(Path::new("/p"), &compiler_options);
        let graph =
            build_module_graph(&store, Path::new("/p/dist/index.d.ts"), &options, &NodeResolver)
                .unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(
            graph.order,
            vec![
                PathBuf::from("/p/dist/index.d.ts"),
                PathBuf::from("/p/dist/types.d.ts"),
                PathBuf::from("/p/dist/util.d.ts"),
            ]
        );
        let entry = &graph.modules[&PathBuf::from("/p/dist/index.d.ts")];
        assert_eq!(entry.imports.len(), 2);
        assert_eq!(
            graph.bundled_specifiers[&PathBuf::from("/p/dist/index.d.ts")],
            vec!["./types".to_string(), "./util".to_string()]
        );
    }

    #[test]
    fn entry_source_path_maps_through_out_dir() {
        let store = store_with(&[("/p/dist/index.d.ts", "export declare const a: number;\n")]);
        let compiler_options = CompilerOptions {
            out_dir: Some(PathBuf::from("dist")),
            root_dir: Some(PathBuf::from("src")),
            ..Default::default()
        };
        let options = graph_options(Path::new("/p"), &compiler_options);
        let graph =
            build_module_graph(&store, Path::new("src/index.ts"), &options, &NodeResolver).unwrap();
        assert!(graph
            .modules
            .contains_key(&PathBuf::from("/p/dist/index.d.ts")));
    }

    #[test]
    fn missing_entry_is_a_bundle_error() {
        let store = store_with(&[]);
        let compiler_options = CompilerOptions::default();
        let options = graph_options(Path::new("/p"), &compiler_options);
        let err =
            build_module_graph(&store, Path::new("/p/dist/nope.d.ts"), &options, &NodeResolver)
                .unwrap_err();
        assert!(matches!(err, BuildError::Bundle(_)));
    }

    #[test]
    fn external_pattern_keeps_import_out_of_graph() {
        let store = store_with(&[
            (
                "/p/dist/index.d.ts",
                "import { x } from \"./dep\";\nimport { y } from \"skipme\";\nexport { x, y };\n",
            ),
            ("/p/dist/dep.d.ts", "export declare const x: number;\n"),
        ]);
        let compiler_options = CompilerOptions::default();
        let external = vec![Pattern::literal("skipme")];
        let options = GraphOptions {
            external: &external,
            no_external: &[],
            resolve: false,
            project_dir: Path::new("/p"),
            compiler_options: &compiler_options,
        };
        let graph =
            build_module_graph(&store, Path::new("/p/dist/index.d.ts"), &options, &NodeResolver)
                .unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(
            graph.bundled_specifiers[&PathBuf::from("/p/dist/index.d.ts")],
            vec!["./dep".to_string()]
        );
    }

    #[test]
    fn node_modules_stays_external_without_no_external() {
        let temp = tempfile::TempDir::new().unwrap();
        let lib = temp.path().join("node_modules/lib/index.d.ts");
        std::fs::create_dir_all(lib.parent().unwrap()).unwrap();
        std::fs::write(&lib, "export interface User { id: number }\n").unwrap();

        let index = temp.path().join("dist/index.d.ts");
        let store = store_with(&[(
            index.to_str().unwrap(),
            "import { User } from \"lib\";\nexport { User };\n",
        )]);
        let compiler_options = CompilerOptions::default();

        // Without noExternal the dependency is skipped.
        let options = GraphOptions {
            external: &[],
            no_external: &[],
            resolve: true,
            project_dir: temp.path(),
            compiler_options: &compiler_options,
        };
        let graph = build_module_graph(&store, &index, &options, &NodeResolver).unwrap();
        assert_eq!(graph.len(), 1);

        // With noExternal the declaration is lazily loaded from disk.
        let no_external = vec![Pattern::literal("lib")];
        let options = GraphOptions {
            external: &[],
            no_external: &no_external,
            resolve: true,
            project_dir: temp.path(),
            compiler_options: &compiler_options,
        };
        let graph = build_module_graph(&store, &index, &options, &NodeResolver).unwrap();
        assert_eq!(graph.len(), 2);
        let lib_path = normalize_path(&lib);
        assert!(graph.modules.contains_key(&lib_path));
        assert!(graph.modules[&lib_path].identifiers.is_type("User"));
    }

    #[test]
    fn identifier_map_classifies_declarations() {
        let file = parser::parse(
            "interface I {}\ntype T = I;\ndeclare class C {}\ndeclare function f(): void;\ndeclare enum E {}\ndeclare const v: number;\ndeclare namespace NS { interface Inner {} }\n",
        );
        let map = collect_identifier_map(&file.statements);
        assert!(map.is_type("I"));
        assert!(map.is_type("T"));
        assert!(map.is_value("C"));
        assert!(map.is_value("f"));
        assert!(map.is_value("E"));
        assert!(map.is_value("v"));
        assert!(map.is_value("NS"));
        // Module blocks are recursed into.
        assert!(map.is_type("Inner"));
    }

    #[test]
    fn cycles_terminate() {
        let store = store_with(&[
            (
                "/p/dist/a.d.ts",
                "import { B } from \"./b\";\nexport interface A { b: B }\n",
            ),
            (
                "/p/dist/b.d.ts",
                "import { A } from \"./a\";\nexport interface B { a: A }\n",
            ),
        ]);
        let compiler_options = CompilerOptions::default();
        let options = graph_options(Path::new("/p"), &compiler_options);
        let graph =
            build_module_graph(&store, Path::new("/p/dist/a.d.ts"), &options, &NodeResolver)
                .unwrap();
        assert_eq!(graph.len(), 2);
    }
}
