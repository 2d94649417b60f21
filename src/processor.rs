//! Canonical declaration processing.
//!
//! The pre-process pass turns a raw declaration file into a canonical,
//! self-contained block the bundler can rearrange: triple-slash directives
//! are lifted into reference sets, `export`/`default` modifiers are stripped
//! in favor of one trailing aggregated export clause, `declare` modifiers are
//! normalized, multi-name variable statements are split, inline
//! `import("spec")` types become top-level namespace imports, and statements
//! declaring the same identifier are grouped together.
//!
//! Pre-processing is idempotent: running it over its own output reproduces
//! the text byte for byte.
//!
//! The post-process pass cleans bundled output: empty statements are dropped,
//! relative specifiers lose their declaration extension in favor of `.js`,
//! and `{ X as X }` re-exports inside namespace bodies collapse to `{ X }`.

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::char_codes::{is_identifier_part, is_identifier_text};
use crate::error::BuildError;
use crate::parser::{self, ModifierKind, Statement, StatementKind};
use crate::rewrite::Rewriter;
use crate::span::Span;

/// A canonical pre-processed declaration with the reference directives
/// extracted from the original text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedDeclaration {
    pub code: String,
    #[serde(default)]
    pub type_references: Vec<String>,
    #[serde(default)]
    pub file_references: Vec<String>,
}

static DIRECTIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*///[ \t]*<reference[ \t]+(types|path)[ \t]*=[ \t]*["']([^"']*)["'][ \t]*/>[ \t]*\r?\n?"#,
    )
    .expect("directive regex")
});

/// Pre-process a raw declaration file into its canonical form.
pub fn pre_process(source: &str) -> Result<CachedDeclaration, BuildError> {
    let file = parser::parse(source);
    let mut p = PreProcessor::new(source);
    p.collect_declared(&file.statements);

    let mut items: Vec<Emitted> = Vec::new();
    for stmt in &file.statements {
        items.extend(p.process_statement(stmt)?);
    }
    let trailing = file.trailing_text(source);
    if !trailing.is_empty() {
        items.push(Emitted {
            name: None,
            text: trailing.to_string(),
        });
    }
    for item in &mut items {
        item.text = p.strip_directives(&item.text);
    }

    let mut out = String::new();
    for (spec, name) in &p.synth_imports {
        out.push_str(&format!("import * as {name} from \"{spec}\";\n"));
    }
    out.push_str(&group_and_join(items));

    if !p.exports.is_empty() || p.default_name.is_some() {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
    }
    if !p.exports.is_empty() {
        let elements: Vec<String> = p
            .exports
            .iter()
            .map(|(local, exported)| {
                if local == exported {
                    local.clone()
                } else {
                    format!("{local} as {exported}")
                }
            })
            .collect();
        out.push_str(&format!("export {{ {} }};\n", elements.join(", ")));
    }
    if let Some(default) = &p.default_name {
        out.push_str(&format!("export default {default};\n"));
    }

    Ok(CachedDeclaration {
        code: out,
        type_references: p.type_references,
        file_references: p.file_references,
    })
}

/// Final cleanup over bundled output.
pub fn post_process(source: &str) -> String {
    let file = parser::parse(source);
    let mut rw = Rewriter::new();
    for stmt in &file.statements {
        post_statement(source, stmt, false, &mut rw);
    }
    rw.apply(source)
}

struct Emitted {
    /// Declared name, for same-name grouping.
    name: Option<String>,
    text: String,
}

/// Edits against a statement slice, addressed by absolute file positions.
struct SliceEdits {
    base: usize,
    rw: Rewriter,
}

impl SliceEdits {
    fn new(base: usize) -> Self {
        SliceEdits {
            base,
            rw: Rewriter::new(),
        }
    }

    fn delete(&mut self, span: Span) {
        self.rw.delete(span.rebased(self.base));
    }

    fn replace(&mut self, span: Span, text: impl Into<String>) {
        self.rw.replace(span.rebased(self.base), text);
    }

    fn insert(&mut self, pos: usize, text: impl Into<String>) {
        self.rw.insert(pos - self.base, text);
    }
}

struct PreProcessor<'a> {
    source: &'a str,
    /// Every name declared anywhere in the file, for synthetic-name
    /// de-confliction.
    declared: FxHashSet<String>,
    used_names: FxHashSet<String>,
    /// `(local, exported)` pairs in document order, deduplicated by exported
    /// name.
    exports: Vec<(String, String)>,
    export_seen: FxHashSet<String>,
    default_name: Option<String>,
    synth_imports: Vec<(String, String)>,
    synth_by_spec: FxHashMap<String, String>,
    type_references: Vec<String>,
    file_references: Vec<String>,
    reference_seen: FxHashSet<(bool, String)>,
}

impl<'a> PreProcessor<'a> {
    fn new(source: &'a str) -> Self {
        PreProcessor {
            source,
            declared: FxHashSet::default(),
            used_names: FxHashSet::default(),
            exports: Vec::new(),
            export_seen: FxHashSet::default(),
            default_name: None,
            synth_imports: Vec::new(),
            synth_by_spec: FxHashMap::default(),
            type_references: Vec::new(),
            file_references: Vec::new(),
            reference_seen: FxHashSet::default(),
        }
    }

    fn collect_declared(&mut self, statements: &[Statement]) {
        for stmt in statements {
            match &stmt.kind {
                StatementKind::Class(d)
                | StatementKind::Function(d)
                | StatementKind::Enum(d)
                | StatementKind::Interface(d)
                | StatementKind::TypeAlias(d) => {
                    if let Some(name) = &d.name {
                        self.declared.insert(name.clone());
                    }
                }
                StatementKind::Variable(v) => {
                    for d in &v.declarators {
                        self.declared.insert(d.name.clone());
                    }
                }
                StatementKind::Module(m) => {
                    if !m.quoted && !m.is_global {
                        self.declared.insert(m.name.clone());
                    }
                    self.collect_declared(&m.statements);
                }
                _ => {}
            }
        }
        self.used_names.extend(self.declared.iter().cloned());
    }

    fn record_export(&mut self, local: String, exported: String) {
        if self.export_seen.insert(exported.clone()) {
            self.exports.push((local, exported));
        }
    }

    fn process_statement(&mut self, stmt: &Statement) -> Result<Vec<Emitted>, BuildError> {
        match &stmt.kind {
            // A local export clause is absorbed into the aggregated trailing
            // export; re-export clauses with a specifier stay for the graph
            // builder.
            StatementKind::ExportNamed(decl) if decl.specifier.is_none() => {
                for el in &decl.elements {
                    self.record_export(el.local.clone(), el.exported_name().to_string());
                }
                Ok(Vec::new())
            }
            StatementKind::ExportDefaultName { name } => {
                self.default_name = Some(name.clone());
                Ok(Vec::new())
            }
            StatementKind::ExportAssignment { name: Some(name) } => {
                self.default_name = Some(name.clone());
                Ok(Vec::new())
            }
            StatementKind::Variable(v) if v.declarators.len() > 1 => self.split_variable(stmt, v),
            _ => self.rewrite_statement(stmt),
        }
    }

    /// One statement per declared name, each carrying `declare` and the
    /// original keyword.
    fn split_variable(
        &mut self,
        stmt: &Statement,
        var: &parser::VariableStatement,
    ) -> Result<Vec<Emitted>, BuildError> {
        let has_export = stmt.has_modifier(ModifierKind::Export);
        let lead = &self.source[stmt.full_span.start..stmt.start];
        let mut out = Vec::with_capacity(var.declarators.len());
        for (i, declarator) in var.declarators.iter().enumerate() {
            if has_export {
                self.record_export(declarator.name.clone(), declarator.name.clone());
            }
            let mut edits = SliceEdits::new(declarator.span.start);
            for it in &stmt.import_types {
                if it.span.start >= declarator.span.start && it.span.end <= declarator.span.end {
                    let name = self.rewrite_import_type(it)?;
                    edits.replace(it.span, name);
                }
            }
            let decl_text = edits.rw.apply(declarator.span.text(self.source));
            let text = if i == 0 {
                format!("{lead}declare {} {decl_text};", var.keyword.as_str())
            } else {
                format!("\ndeclare {} {decl_text};", var.keyword.as_str())
            };
            out.push(Emitted {
                name: Some(declarator.name.clone()),
                text,
            });
        }
        Ok(out)
    }

    fn rewrite_statement(&mut self, stmt: &Statement) -> Result<Vec<Emitted>, BuildError> {
        let mut edits = SliceEdits::new(stmt.full_span.start);
        self.rewrite_import_types_rec(stmt, &mut edits)?;
        self.sanitize_clauses(stmt, &mut edits, false);
        self.normalize_modifiers(stmt, &mut edits);
        let text = edits.rw.apply(stmt.full_span.text(self.source));
        Ok(vec![Emitted {
            name: stmt.declared_name().map(str::to_string),
            text,
        }])
    }

    /// Replace inline `import("spec")` forms, recursing into module bodies.
    fn rewrite_import_types_rec(
        &mut self,
        stmt: &Statement,
        edits: &mut SliceEdits,
    ) -> Result<(), BuildError> {
        for it in &stmt.import_types {
            let name = self.rewrite_import_type(it)?;
            edits.replace(it.span, name);
        }
        if let StatementKind::Module(m) = &stmt.kind {
            for inner in &m.statements {
                self.rewrite_import_types_rec(inner, edits)?;
            }
        }
        Ok(())
    }

    fn rewrite_import_type(&mut self, it: &parser::ImportTypeRef) -> Result<String, BuildError> {
        let Some(spec) = &it.specifier else {
            return Err(BuildError::UnsupportedSyntax {
                message: format!(
                    "inline import() at offset {} takes a non-literal argument",
                    it.span.start
                ),
            });
        };
        Ok(self.synth_import_name(spec))
    }

    fn synth_import_name(&mut self, spec: &str) -> String {
        if let Some(name) = self.synth_by_spec.get(spec) {
            return name.clone();
        }
        let mut base: String = spec
            .chars()
            .map(|c| if is_identifier_part(c) { c } else { '_' })
            .collect();
        if !is_identifier_text(&base) {
            base.insert(0, '_');
        }
        let mut name = base.clone();
        let mut counter = 0u32;
        while self.used_names.contains(&name) {
            counter += 1;
            name = format!("{base}${counter}");
        }
        self.used_names.insert(name.clone());
        self.synth_by_spec.insert(spec.to_string(), name.clone());
        self.synth_imports.push((spec.to_string(), name.clone()));
        name
    }

    /// Import/export clause sanitation and namespace re-export aliasing,
    /// recursing into module bodies.
    fn sanitize_clauses(&mut self, stmt: &Statement, edits: &mut SliceEdits, inside_module: bool) {
        match &stmt.kind {
            StatementKind::Import(decl) => {
                if let Some(span) = decl.type_span {
                    edits.delete(span);
                }
                if let Some(named) = &decl.named {
                    for el in named {
                        if let Some(span) = el.type_span {
                            edits.delete(span);
                        }
                    }
                }
            }
            StatementKind::ExportNamed(decl) => {
                if let Some(span) = decl.type_span {
                    edits.delete(span);
                }
                // Inside a namespace, `export { Name }` gains an explicit
                // alias so later renames cannot break the re-export.
                if inside_module && decl.specifier.is_none() {
                    for el in &decl.elements {
                        if el.exported.is_none() {
                            edits.insert(el.local_span.end, format!(" as {}", el.local));
                        }
                    }
                }
            }
            StatementKind::ExportStar(decl) => {
                if let Some(span) = decl.type_span {
                    edits.delete(span);
                }
            }
            StatementKind::Module(m) => {
                for inner in &m.statements {
                    self.sanitize_clauses(inner, edits, true);
                }
            }
            _ => {}
        }
    }

    /// Top-level modifier normalization: strip `export`/`default`, record the
    /// exported names, insert `declare` where required.
    fn normalize_modifiers(&mut self, stmt: &Statement, edits: &mut SliceEdits) {
        let is_decl = matches!(
            stmt.kind,
            StatementKind::Class(_)
                | StatementKind::Function(_)
                | StatementKind::Enum(_)
                | StatementKind::Interface(_)
                | StatementKind::TypeAlias(_)
                | StatementKind::Module(_)
                | StatementKind::Variable(_)
        );
        if !is_decl {
            return;
        }

        let has_export = stmt.has_modifier(ModifierKind::Export);
        let has_default = stmt.has_modifier(ModifierKind::Default);
        if let Some(span) = stmt.modifier_span(ModifierKind::Export) {
            edits.delete(span);
        }
        if let Some(span) = stmt.modifier_span(ModifierKind::Default) {
            edits.delete(span);
        }

        if has_default {
            let name = match stmt.declared_name() {
                Some(name) => name.to_string(),
                None => {
                    let name = self.synthesize_default_name();
                    if let StatementKind::Class(d) | StatementKind::Function(d) = &stmt.kind {
                        edits.insert(d.name_insert_pos, format!(" {name}"));
                    }
                    name
                }
            };
            self.default_name = Some(name);
        } else if has_export {
            match &stmt.kind {
                StatementKind::Variable(v) => {
                    for d in &v.declarators {
                        self.record_export(d.name.clone(), d.name.clone());
                    }
                }
                _ => {
                    if let Some(name) = stmt.declared_name() {
                        self.record_export(name.to_string(), name.to_string());
                    }
                }
            }
        }

        if stmt.needs_declare() && !stmt.has_modifier(ModifierKind::Declare) {
            edits.insert(self.declare_insert_pos(stmt), "declare ");
        }
    }

    /// `declare` goes before the first kept modifier, after any stripped
    /// leading `export`/`default`.
    fn declare_insert_pos(&self, stmt: &Statement) -> usize {
        let mut pos = stmt.start;
        for m in &stmt.modifiers {
            match m.kind {
                ModifierKind::Export | ModifierKind::Default if m.span.start == pos => {
                    pos = m.span.end;
                }
                _ => break,
            }
        }
        pos
    }

    fn synthesize_default_name(&mut self) -> String {
        let mut name = String::from("export_default");
        while self.declared.contains(&name) || self.used_names.contains(&name) {
            name.insert(0, '_');
        }
        self.used_names.insert(name.clone());
        name
    }

    /// Remove triple-slash reference directives, collecting their targets in
    /// document order.
    fn strip_directives(&mut self, text: &str) -> String {
        if !text.contains("///") {
            return text.to_string();
        }
        for captures in DIRECTIVE_RE.captures_iter(text) {
            let is_types = &captures[1] == "types";
            let target = captures[2].to_string();
            if self.reference_seen.insert((is_types, target.clone())) {
                if is_types {
                    self.type_references.push(target);
                } else {
                    self.file_references.push(target);
                }
            }
        }
        DIRECTIVE_RE.replace_all(text, "").into_owned()
    }
}

/// Group statements so all declarations of the same identifier sit together,
/// keeping first-seen order otherwise.
fn group_and_join(items: Vec<Emitted>) -> String {
    let mut groups: Vec<Vec<String>> = Vec::new();
    let mut index: FxHashMap<String, usize> = FxHashMap::default();
    for item in items {
        match item.name {
            Some(name) => {
                if let Some(&i) = index.get(&name) {
                    groups[i].push(item.text);
                } else {
                    index.insert(name, groups.len());
                    groups.push(vec![item.text]);
                }
            }
            None => groups.push(vec![item.text]),
        }
    }
    let mut out = String::new();
    for group in groups {
        for text in group {
            out.push_str(&text);
        }
    }
    out
}

fn post_statement(source: &str, stmt: &Statement, inside_module: bool, rw: &mut Rewriter) {
    match &stmt.kind {
        StatementKind::Empty => {
            rw.delete(Span::new(stmt.start, stmt.full_span.end));
        }
        StatementKind::Import(decl) => {
            rewrite_declaration_extension(source, &decl.specifier, decl.specifier_span, rw);
        }
        StatementKind::ImportEquals(decl) => {
            rewrite_declaration_extension(source, &decl.specifier, decl.specifier_span, rw);
        }
        StatementKind::ExportNamed(decl) => {
            if let (Some(spec), Some(span)) = (&decl.specifier, decl.specifier_span) {
                rewrite_declaration_extension(source, spec, span, rw);
            }
            if inside_module && decl.specifier.is_none() {
                for el in &decl.elements {
                    if el.exported.as_deref() == Some(el.local.as_str()) {
                        rw.replace(el.span, el.local.clone());
                    }
                }
            }
        }
        StatementKind::ExportStar(decl) => {
            rewrite_declaration_extension(source, &decl.specifier, decl.specifier_span, rw);
        }
        StatementKind::Module(m) => {
            for inner in &m.statements {
                post_statement(source, inner, true, rw);
            }
        }
        _ => {}
    }
}

/// Relative specifiers that point at declaration files are retargeted to the
/// JavaScript the transpiler emits. Bare and absolute specifiers stay.
fn rewrite_declaration_extension(source: &str, spec: &str, span: Span, rw: &mut Rewriter) {
    if !(spec.starts_with("./") || spec.starts_with("../")) {
        return;
    }
    let stem = if let Some(stem) = spec.strip_suffix(".d.ts") {
        stem
    } else if let Some(stem) = spec.strip_suffix(".d.tsx") {
        stem
    } else {
        return;
    };
    let quote = span.text(source).chars().next().unwrap_or('"');
    rw.replace(span, format!("{quote}{stem}.js{quote}"));
}
