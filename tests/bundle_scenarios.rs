//! End-to-end bundling scenarios over real project layouts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::TempDir;

use tsbundle::cleanup::CleanupRegistry;
use tsbundle::compiler::{
    CancelToken, Compiler, CompilerOptions, DeclarationWriter, EmitResult,
};
use tsbundle::composer::{compose_bundle, BundledDeclaration};
use tsbundle::config::ProjectConfig;
use tsbundle::driver::Builder;
use tsbundle::graph::{build_module_graph, GraphOptions};
use tsbundle::pattern::Pattern;
use tsbundle::processor;
use tsbundle::resolver::NodeResolver;
use tsbundle::store::DeclarationStore;

struct Project {
    temp: TempDir,
}

impl Project {
    fn new() -> Self {
        Project {
            temp: TempDir::new().expect("temp project"),
        }
    }

    fn root(&self) -> &Path {
        self.temp.path()
    }

    fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.root().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).expect("create parent");
        std::fs::write(&path, contents).expect("write file");
        path
    }
}

/// Feed declaration files through the store's write callback and bundle one
/// entry.
fn bundle(
    project: &Project,
    files: &[(&str, &str)],
    entry: &str,
    external: &[Pattern],
    no_external: &[Pattern],
    resolve: bool,
) -> BundledDeclaration {
    let mut store = DeclarationStore::new(None);
    store.initialize();
    for (relative, text) in files {
        let path = project.root().join(relative);
        store.write_file(&path, text).expect("store write");
    }
    let store = Mutex::new(store);
    let compiler_options = CompilerOptions::default();
    let options = GraphOptions {
        external,
        no_external,
        resolve,
        project_dir: project.root(),
        compiler_options: &compiler_options,
    };
    let graph = build_module_graph(
        &store,
        &project.root().join(entry),
        &options,
        &NodeResolver,
    )
    .expect("graph");
    compose_bundle(&graph, external)
}

#[test]
fn two_project_modules_with_a_local_import() {
    let project = Project::new();
    let bundled = bundle(
        &project,
        &[
            (
                "dist/index.d.ts",
                "import { User } from \"./types\";\nexport { User };\n",
            ),
            ("dist/types.d.ts", "export interface User { name: string }\n"),
        ],
        "dist/index.d.ts",
        &[],
        &[],
        false,
    );
    assert!(bundled.code.contains("interface User { name: string }"));
    assert!(bundled.code.trim_end().ends_with("export type { User };"));
    assert!(
        !bundled.code.contains("import"),
        "no import lines survive: {}",
        bundled.code
    );
}

#[test]
fn collision_with_a_node_modules_dependency() {
    let project = Project::new();
    project.write(
        "node_modules/lib/index.d.ts",
        "export interface User { id: number }\n",
    );
    let no_external = vec![Pattern::literal("lib")];
    let bundled = bundle(
        &project,
        &[
            (
                "dist/index.d.ts",
                "import { User } from \"./types\";\nimport { User as LibUser } from \"lib\";\nexport { User, LibUser };\n",
            ),
            ("dist/types.d.ts", "export interface User { name: string }\n"),
        ],
        "dist/index.d.ts",
        &[],
        &no_external,
        true,
    );
    assert!(bundled.code.contains("interface User { name: string }"));
    assert!(bundled.code.contains("interface User$1 { id: number }"));
    assert!(bundled.exports.contains(&"User".to_string()));
    assert!(bundled.exports.contains(&"User$1".to_string()));
}

#[test]
fn empty_exports_are_stripped() {
    let pre = processor::pre_process("export {};\nexport declare const a: number;\n").unwrap();
    assert!(pre.code.contains("declare const a: number;"));
    assert!(pre.code.contains("export { a };"));
    assert_eq!(pre.code.matches("export").count(), 1);
}

#[test]
fn declaration_extension_specifiers_are_rewritten() {
    // The sibling declaration is left out of the store, so its import stays
    // external and the post-pass retargets the specifier to `.js`.
    let project = Project::new();
    let bundled = bundle(
        &project,
        &[(
            "dist/index.d.ts",
            "import { a } from \"./other.d.ts\";\nexport declare function use(): typeof a;\nexport { use };\n",
        )],
        "dist/index.d.ts",
        &[],
        &[],
        false,
    );
    assert!(bundled.code.contains("import { a } from \"./other.js\";"));
    assert!(!bundled.code.contains(".d.ts\""));
}

#[test]
fn inline_import_is_resolved_to_a_namespace_import() {
    let pre =
        processor::pre_process("export type MyType = import(\"./mod\").SomeType;\n").unwrap();
    assert!(pre.code.starts_with("import * as __mod from \"./mod\";\n"));
    assert!(pre.code.contains("type MyType = __mod.SomeType;"));
}

/// Compiler fake for driver-level scenarios.
struct ScriptedCompiler {
    files: Vec<(PathBuf, String)>,
}

impl Compiler for ScriptedCompiler {
    fn emit(
        &mut self,
        writer: &mut dyn DeclarationWriter,
        _cancel: &CancelToken,
        _emit_only_dts_files: bool,
    ) -> EmitResult {
        for (path, text) in &self.files {
            writer.write_file(path, text).expect("emit");
        }
        EmitResult::default()
    }
}

#[test]
fn incremental_no_op_skips_all_downstream_work() {
    let project = Project::new();
    let config = ProjectConfig {
        entry: BTreeMap::from([("index".to_string(), "src/index.ts".to_string())]),
        ..Default::default()
    };
    let options = config.into_build_options(project.root()).unwrap();
    assert!(options.cache, "caching defaults on");

    // First build: the compiler emits, the bundle lands on disk.
    {
        let mut compiler = ScriptedCompiler {
            files: vec![
                (
                    project.root().join("dist/index.d.ts"),
                    "import { User } from \"./types\";\nexport { User };\n".to_string(),
                ),
                (
                    project.root().join("dist/types.d.ts"),
                    "export interface User { name: string }\n".to_string(),
                ),
            ],
        };
        let cleanup = CleanupRegistry::new();
        let mut builder = Builder::new(&options, &mut compiler, None, &NodeResolver, &cleanup);
        let summary = builder.build().unwrap();
        assert!(!summary.no_op);
        assert!(project.root().join("dist/index.d.ts").exists());
    }
    std::fs::remove_file(project.root().join("dist/index.d.ts")).unwrap();

    // Second run: cache restores, nothing is emitted, finalize gates.
    let mut compiler = ScriptedCompiler { files: Vec::new() };
    let cleanup = CleanupRegistry::new();
    let mut builder = Builder::new(&options, &mut compiler, None, &NodeResolver, &cleanup);
    let summary = builder.build().unwrap();
    assert!(summary.no_op);
    assert!(summary.bundles.is_empty());
    assert!(
        !project.root().join("dist/index.d.ts").exists(),
        "no declaration output is written on a no-op build"
    );
}

#[test]
fn entry_reexporting_a_bundled_dependency_symbol() {
    let project = Project::new();
    let bundled = bundle(
        &project,
        &[
            (
                "dist/index.d.ts",
                "import { Config } from \"./config\";\nexport declare function load(): Config;\nexport { Config, load };\n",
            ),
            (
                "dist/config.d.ts",
                "export interface Config { verbose: boolean }\n",
            ),
        ],
        "dist/index.d.ts",
        &[],
        &[],
        false,
    );
    // The underlying declaration is present once and the re-export survives.
    assert_eq!(bundled.code.matches("interface Config").count(), 1);
    assert!(bundled.code.contains("export { load };"));
    assert!(bundled.code.contains("export type { Config };"));
}

#[test]
fn rename_uniqueness_across_three_modules() {
    let project = Project::new();
    let bundled = bundle(
        &project,
        &[
            (
                "dist/index.d.ts",
                "import { Shape } from \"./a\";\nimport { Shape as ShapeB } from \"./b\";\nimport { Shape as ShapeC } from \"./c\";\nexport { Shape, ShapeB, ShapeC };\n",
            ),
            ("dist/a.d.ts", "export interface Shape { a: number }\n"),
            ("dist/b.d.ts", "export interface Shape { b: number }\n"),
            ("dist/c.d.ts", "export interface Shape { c: number }\n"),
        ],
        "dist/index.d.ts",
        &[],
        &[],
        false,
    );
    assert!(bundled.all_declarations.contains("Shape"));
    assert!(bundled.all_declarations.contains("Shape$1"));
    assert!(bundled.all_declarations.contains("Shape$2"));
    assert_eq!(bundled.code.matches("interface Shape {").count(), 1);
    assert_eq!(bundled.code.matches("interface Shape$1 {").count(), 1);
    assert_eq!(bundled.code.matches("interface Shape$2 {").count(), 1);
}

#[test]
fn value_and_type_collision_exports_value_only() {
    let project = Project::new();
    let bundled = bundle(
        &project,
        &[
            (
                "dist/index.d.ts",
                "import { Entry } from \"./value\";\nimport { Entry as EntryType } from \"./type\";\nexport { Entry, EntryType };\n",
            ),
            ("dist/value.d.ts", "export declare class Entry {}\n"),
            ("dist/type.d.ts", "export interface Entry { x: number }\n"),
        ],
        "dist/index.d.ts",
        &[],
        &[],
        false,
    );
    assert!(bundled.code.contains("declare class Entry {"));
    assert!(bundled.code.contains("interface Entry$1 {"));
    assert!(bundled.code.contains("export { Entry };"));
    assert!(bundled.code.contains("export type { Entry$1 };"));
}
