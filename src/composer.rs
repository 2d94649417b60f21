//! Bundle composition.
//!
//! Turns a module graph into one declaration file: modules are emitted in
//! dependency order, identifier collisions across modules are renamed
//! (`Foo`, `Foo$1`, ...), imports and exports are stripped per module and
//! re-aggregated at the bundle level, external imports are merged per
//! `(kind, specifier)` pair, and the assembled text runs through the
//! processor's post-pass.
//!
//! Export lists distinguish values from types; a name that is both is
//! exported as a value only. Modules under `node_modules` contribute their
//! declarations to the body but never to the aggregate export list.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::graph::{ModuleGraph, ModuleInfo};
use crate::parser::{Statement, StatementKind};
use crate::pattern::{matches_any, Pattern};
use crate::processor;
use crate::resolver::is_in_node_modules;
use crate::rewrite::Rewriter;
use crate::span::Span;

/// Per-module rewrite result.
#[derive(Debug, Default)]
pub struct DeclarationCode {
    pub code: String,
    pub external_imports: Vec<ExternalImport>,
    pub type_exports: Vec<String>,
    pub value_exports: Vec<String>,
}

/// The composed bundle.
#[derive(Debug)]
pub struct BundledDeclaration {
    pub code: String,
    /// Every exported name, values and types.
    pub exports: Vec<String>,
    /// Every top-level declared identifier after renaming.
    pub all_declarations: FxHashSet<String>,
}

/// An import statement kept in the output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExternalImport {
    /// Pure named import, mergeable by `(type_only, specifier)`.
    Named {
        type_only: bool,
        specifier: String,
        members: Vec<String>,
    },
    /// Default, namespace, and side-effect imports pass through verbatim.
    Raw(String),
}

/// Compose the bundle for a built module graph. The graph must be non-empty;
/// its first `order` entry is the bundling entry point.
pub fn compose_bundle(graph: &ModuleGraph, external: &[Pattern]) -> BundledDeclaration {
    let rename_map = allocate_renames(graph);
    let topo = topological_order(graph);

    let mut bodies: Vec<String> = Vec::new();
    let mut file_references: Vec<String> = Vec::new();
    let mut type_references: Vec<String> = Vec::new();
    let mut reference_seen: FxHashSet<(bool, String)> = FxHashSet::default();
    let mut external_imports: Vec<ExternalImport> = Vec::new();
    let mut value_exports: Vec<String> = Vec::new();
    let mut type_exports: Vec<String> = Vec::new();

    for path in &topo {
        let module = &graph.modules[*path];
        for reference in &module.file_references {
            if reference_seen.insert((false, reference.clone())) {
                file_references.push(reference.clone());
            }
        }
        for reference in &module.type_references {
            if reference_seen.insert((true, reference.clone())) {
                type_references.push(reference.clone());
            }
        }

        let rewritten = strip_imports_exports(module, graph, &rename_map, external);
        if !rewritten.code.is_empty() {
            bodies.push(rewritten.code);
        }
        external_imports.extend(rewritten.external_imports);
        value_exports.extend(rewritten.value_exports);
        type_exports.extend(rewritten.type_exports);
    }

    // Value exports dominate type exports.
    let value_set: FxHashSet<&String> = value_exports.iter().collect();
    let type_exports: Vec<String> = type_exports
        .iter()
        .filter(|name| !value_set.contains(name))
        .cloned()
        .collect();

    let mut sections: Vec<String> = Vec::new();
    let mut header: Vec<String> = Vec::new();
    for reference in &file_references {
        header.push(format!("/// <reference path=\"{reference}\" />"));
    }
    for reference in &type_references {
        header.push(format!("/// <reference types=\"{reference}\" />"));
    }
    header.extend(merge_external_imports(external_imports));
    if !header.is_empty() {
        sections.push(header.join("\n"));
    }
    if !bodies.is_empty() {
        sections.push(bodies.join("\n\n"));
    }

    let sorted_values = sorted_unique(value_exports);
    let sorted_types = sorted_unique(type_exports);
    let mut export_lines: Vec<String> = Vec::new();
    if !sorted_values.is_empty() {
        export_lines.push(format!("export {{ {} }};", sorted_values.join(", ")));
    }
    if !sorted_types.is_empty() {
        export_lines.push(format!("export type {{ {} }};", sorted_types.join(", ")));
    }
    if !export_lines.is_empty() {
        sections.push(export_lines.join("\n"));
    }

    let mut code = sections.join("\n\n");
    code.push('\n');
    let code = processor::post_process(&code);

    let mut all_declarations = FxHashSet::default();
    for path in &topo {
        let module = &graph.modules[*path];
        for name in module.identifiers.all() {
            all_declarations.insert(renamed_in(&rename_map, name, path));
        }
    }

    let mut exports = sorted_values;
    exports.extend(sorted_types);
    BundledDeclaration {
        code,
        exports,
        all_declarations,
    }
}

/// DFS from the entry; a module is pushed after all its imports, back-edges
/// ignored, so cycles are tolerated.
fn topological_order(graph: &ModuleGraph) -> Vec<&PathBuf> {
    let mut sorted = Vec::with_capacity(graph.len());
    let mut visited: FxHashSet<&PathBuf> = FxHashSet::default();
    let Some(entry) = graph.order.first() else {
        return sorted;
    };
    visit(graph, entry, &mut visited, &mut sorted);
    sorted
}

fn visit<'a>(
    graph: &'a ModuleGraph,
    path: &'a PathBuf,
    visited: &mut FxHashSet<&'a PathBuf>,
    sorted: &mut Vec<&'a PathBuf>,
) {
    if !visited.insert(path) {
        return;
    }
    if let Some(module) = graph.modules.get(path) {
        for import in &module.imports {
            visit(graph, import, visited, sorted);
        }
    }
    sorted.push(path);
}

/// For every name declared by more than one module, the first module in
/// graph order keeps it; the rest get `name$1`, `name$2`, ...
fn allocate_renames(graph: &ModuleGraph) -> FxHashMap<String, String> {
    let mut owners: FxHashMap<&String, Vec<&PathBuf>> = FxHashMap::default();
    for path in &graph.order {
        let module = &graph.modules[path];
        for name in module.identifiers.all() {
            owners.entry(name).or_default().push(path);
        }
    }
    let mut renames = FxHashMap::default();
    for (name, paths) in owners {
        if paths.len() < 2 {
            continue;
        }
        for (i, path) in paths.iter().enumerate().skip(1) {
            renames.insert(
                rename_key(name, path),
                format!("{name}${i}"),
            );
        }
    }
    renames
}

fn rename_key(name: &str, path: &Path) -> String {
    format!("{name}:{}", path.display())
}

fn renamed_in(renames: &FxHashMap<String, String>, name: &str, path: &Path) -> String {
    renames
        .get(&rename_key(name, path))
        .cloned()
        .unwrap_or_else(|| name.to_string())
}

/// An import binding into a bundled module.
#[derive(Debug)]
struct Binding {
    source: PathBuf,
    original: String,
    renamed: String,
}

/// Strip a module's imports and exports, apply renames, and collect what the
/// bundle-level aggregation needs.
pub fn strip_imports_exports(
    module: &ModuleInfo,
    graph: &ModuleGraph,
    renames: &FxHashMap<String, String>,
    external: &[Pattern],
) -> DeclarationCode {
    let empty = Vec::new();
    let bundled = graph
        .bundled_specifiers
        .get(&module.path)
        .unwrap_or(&empty);
    let from_node_modules = is_in_node_modules(&module.path);

    let mut rw = Rewriter::new();
    let mut bindings: FxHashMap<String, Binding> = FxHashMap::default();
    let mut external_imports: Vec<ExternalImport> = Vec::new();
    let mut value_exports: Vec<String> = Vec::new();
    let mut type_exports: Vec<String> = Vec::new();

    for stmt in &module.file.statements {
        let stmt_span = Span::new(stmt.start, stmt.full_span.end);
        match &stmt.kind {
            StatementKind::Import(decl) => {
                rw.delete(stmt_span);
                let is_bundled = bundled.contains(&decl.specifier)
                    && !matches_any(external, &decl.specifier);
                if is_bundled {
                    let Some(target) = module.resolutions.get(&decl.specifier) else {
                        continue;
                    };
                    if let Some(named) = &decl.named {
                        for el in named {
                            let original =
                                el.property_name.clone().unwrap_or_else(|| el.name.clone());
                            let renamed = renamed_in(renames, &original, target);
                            bindings.insert(
                                el.name.clone(),
                                Binding {
                                    source: target.clone(),
                                    original,
                                    renamed,
                                },
                            );
                        }
                    }
                } else {
                    external_imports.push(external_import_of(module, stmt, decl));
                }
            }
            StatementKind::ImportEquals(decl) => {
                rw.delete(stmt_span);
                let is_bundled = bundled.contains(&decl.specifier)
                    && !matches_any(external, &decl.specifier);
                if !is_bundled {
                    external_imports
                        .push(ExternalImport::Raw(stmt_span.text(&module.code).to_string()));
                }
            }
            StatementKind::ExportNamed(decl) => {
                rw.delete(stmt_span);
                if decl.specifier.is_some() || from_node_modules {
                    continue;
                }
                for el in &decl.elements {
                    let (name, is_value) = resolve_export(module, graph, renames, &bindings, el);
                    if is_value {
                        value_exports.push(name);
                    } else {
                        type_exports.push(name);
                    }
                }
            }
            StatementKind::ExportStar(_)
            | StatementKind::ExportDefaultName { .. }
            | StatementKind::ExportAssignment { .. } => {
                rw.delete(stmt_span);
            }
            _ => {
                rename_statement(stmt, module, renames, &bindings, &mut rw);
            }
        }
    }

    let code = rw.apply(&module.code).trim().to_string();
    DeclarationCode {
        code,
        external_imports,
        type_exports,
        value_exports,
    }
}

/// Exported name and value-ness of one export element, resolved through
/// import bindings and the rename map.
fn resolve_export(
    module: &ModuleInfo,
    graph: &ModuleGraph,
    renames: &FxHashMap<String, String>,
    bindings: &FxHashMap<String, Binding>,
    el: &crate::parser::ExportSpecifier,
) -> (String, bool) {
    if let Some(binding) = bindings.get(&el.local) {
        // Re-export of an imported name: the (possibly renamed) target name
        // is what the bundle exposes.
        let is_value = graph
            .modules
            .get(&binding.source)
            .map(|m| {
                m.identifiers.is_value(&binding.original)
                    || !m.identifiers.is_type(&binding.original)
            })
            .unwrap_or(true);
        return (binding.renamed.clone(), is_value);
    }

    let renamed = renames.get(&rename_key(&el.local, &module.path));
    let name = match renamed {
        Some(renamed) => renamed.clone(),
        None => el.exported_name().to_string(),
    };
    let is_value = if module.identifiers.is_value(&el.local) {
        true
    } else {
        // Unknown locals default to value exports.
        !module.identifiers.is_type(&el.local)
    };
    (name, is_value)
}

/// Rewrite renamed identifiers in one statement, module bodies included.
fn rename_statement(
    stmt: &Statement,
    module: &ModuleInfo,
    renames: &FxHashMap<String, String>,
    bindings: &FxHashMap<String, Binding>,
    rw: &mut Rewriter,
) {
    for r in &stmt.refs {
        if let Some(binding) = bindings.get(&r.name) {
            if binding.renamed != r.name {
                rw.replace(r.span, binding.renamed.clone());
            }
            continue;
        }
        if let Some(renamed) = renames.get(&rename_key(&r.name, &module.path)) {
            rw.replace(r.span, renamed.clone());
        }
    }
    match &stmt.kind {
        StatementKind::Module(m) => {
            for inner in &m.statements {
                rename_statement(inner, module, renames, bindings, rw);
            }
        }
        // Only nested export clauses reach this pass (top-level ones are
        // stripped). Pre-processing pinned the exported name with an alias,
        // so the local side follows the rename.
        StatementKind::ExportNamed(decl) => {
            for el in &decl.elements {
                if el.exported.is_none() {
                    continue;
                }
                if let Some(renamed) = renames.get(&rename_key(&el.local, &module.path)) {
                    rw.replace(el.local_span, renamed.clone());
                }
            }
        }
        _ => {}
    }
}

fn external_import_of(
    module: &ModuleInfo,
    stmt: &Statement,
    decl: &crate::parser::ImportDecl,
) -> ExternalImport {
    let has_named_only = decl.default_name.is_none()
        && decl.namespace_name.is_none()
        && decl.named.is_some();
    if !has_named_only {
        let text = Span::new(stmt.start, stmt.full_span.end)
            .text(&module.code)
            .to_string();
        return ExternalImport::Raw(text);
    }
    let members = decl
        .named
        .as_ref()
        .expect("named import")
        .iter()
        .map(|el| match &el.property_name {
            Some(prop) => format!("{prop} as {}", el.name),
            None => el.name.clone(),
        })
        .collect();
    ExternalImport::Named {
        type_only: decl.type_span.is_some(),
        specifier: decl.specifier.clone(),
        members,
    }
}

/// Collate named imports per `(kind, specifier)` with sorted, deduplicated
/// member lists; everything else passes through once.
fn merge_external_imports(imports: Vec<ExternalImport>) -> Vec<String> {
    enum Slot {
        Named { type_only: bool, specifier: String },
        Raw(String),
    }
    let mut slots: Vec<Slot> = Vec::new();
    let mut members: FxHashMap<(bool, String), BTreeSet<String>> = FxHashMap::default();
    let mut raw_seen: FxHashSet<String> = FxHashSet::default();

    for import in imports {
        match import {
            ExternalImport::Named {
                type_only,
                specifier,
                members: list,
            } => {
                let key = (type_only, specifier.clone());
                if !members.contains_key(&key) {
                    slots.push(Slot::Named {
                        type_only,
                        specifier,
                    });
                }
                members.entry(key).or_default().extend(list);
            }
            ExternalImport::Raw(text) => {
                if raw_seen.insert(text.clone()) {
                    slots.push(Slot::Raw(text));
                }
            }
        }
    }

    slots
        .into_iter()
        .map(|slot| match slot {
            Slot::Named {
                type_only,
                specifier,
            } => {
                let list: Vec<String> = members[&(type_only, specifier.clone())]
                    .iter()
                    .cloned()
                    .collect();
                let keyword = if type_only { "import type" } else { "import" };
                format!("{keyword} {{ {} }} from \"{specifier}\";", list.join(", "))
            }
            Slot::Raw(text) => text,
        })
        .collect()
}

fn sorted_unique(names: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = names;
    out.sort();
    out.dedup();
    out
}
