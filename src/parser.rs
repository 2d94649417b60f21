//! Thin statement-level parser for declaration files.
//!
//! The bundler never needs a full TypeScript AST. What the processor and
//! composer need from a `.d.ts` file is the top-level statement structure:
//! statement kinds with byte spans, modifier spans, declared names,
//! import/export clause shapes, inline `import("spec")` type positions, and
//! the identifier occurrences that a rename pass may rewrite. This parser
//! produces exactly that, one flat record per statement, recursing only into
//! module/namespace bodies.
//!
//! Types, heritage clauses and member bodies are skimmed by a
//! bracket-balanced token walk ([`Parser::scan_region`]) that classifies each
//! identifier as a reference or a member/parameter name by its neighbor
//! tokens. Property keys and qualified-name tails are never collected, so
//! renaming cannot touch non-identifier text.

use crate::scanner::{Scanner, SyntaxKind};
use crate::span::Span;

/// A parsed declaration file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub statements: Vec<Statement>,
    /// Offset where the trailing trivia after the last statement begins.
    pub trailing_start: usize,
    pub len: usize,
}

impl SourceFile {
    /// Trailing text after the final statement (comments, newlines).
    pub fn trailing_text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.trailing_start..self.len]
    }
}

/// Modifier kinds tracked on statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierKind {
    Export,
    Default,
    Declare,
    Abstract,
    Async,
    /// `const` on a `const enum`.
    Const,
}

#[derive(Debug, Clone, Copy)]
pub struct Modifier {
    pub kind: ModifierKind,
    /// Spans the keyword and its trailing whitespace, so deletion leaves no
    /// double spaces behind.
    pub span: Span,
}

/// An identifier occurrence that a rename pass may rewrite.
#[derive(Debug, Clone)]
pub struct IdentRef {
    pub name: String,
    pub span: Span,
}

/// An inline `import("spec")` type position.
///
/// The span covers `import ( "spec" )` only; any trailing qualifier or type
/// arguments are left in place by rewrites. `specifier` is `None` when the
/// argument is not a string literal, which the processor reports as
/// unsupported syntax.
#[derive(Debug, Clone)]
pub struct ImportTypeRef {
    pub specifier: Option<String>,
    pub span: Span,
}

/// Declaration header common to class/function/enum/interface/type-alias.
#[derive(Debug, Clone)]
pub struct DeclName {
    pub name: Option<String>,
    pub name_span: Option<Span>,
    /// Insertion point for a synthesized name (end of the keyword).
    pub name_insert_pos: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSpecifier {
    /// Span of an inline `type` marker including trailing whitespace.
    pub type_span: Option<Span>,
    /// `a` in `a as b`; `None` when the binding is not renamed.
    pub property_name: Option<String>,
    /// Local binding name.
    pub name: String,
    pub name_span: Span,
}

#[derive(Debug, Clone)]
pub struct ImportDecl {
    /// Span of a leading `import type` marker including trailing whitespace.
    pub type_span: Option<Span>,
    pub default_name: Option<(String, Span)>,
    pub namespace_name: Option<(String, Span)>,
    pub named: Option<Vec<ImportSpecifier>>,
    pub specifier: String,
    /// Specifier span including quotes.
    pub specifier_span: Span,
}

/// `import Name = require("spec");`
#[derive(Debug, Clone)]
pub struct ImportEqualsDecl {
    pub name: String,
    pub specifier: String,
    pub specifier_span: Span,
}

#[derive(Debug, Clone)]
pub struct ExportSpecifier {
    pub local: String,
    pub local_span: Span,
    pub exported: Option<String>,
    /// Local name through the end of the alias, if any.
    pub span: Span,
}

impl ExportSpecifier {
    pub fn exported_name(&self) -> &str {
        self.exported.as_deref().unwrap_or(&self.local)
    }
}

#[derive(Debug, Clone)]
pub struct ExportNamedDecl {
    /// Span of the `type` in `export type { ... }`, trailing whitespace
    /// included.
    pub type_span: Option<Span>,
    pub elements: Vec<ExportSpecifier>,
    pub specifier: Option<String>,
    pub specifier_span: Option<Span>,
}

#[derive(Debug, Clone)]
pub struct ExportStarDecl {
    /// Span of the `type` in `export type * from`, trailing whitespace
    /// included.
    pub type_span: Option<Span>,
    pub namespace: Option<String>,
    pub specifier: String,
    pub specifier_span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKeyword {
    Const,
    Let,
    Var,
}

impl VarKeyword {
    pub fn as_str(self) -> &'static str {
        match self {
            VarKeyword::Const => "const",
            VarKeyword::Let => "let",
            VarKeyword::Var => "var",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Declarator {
    pub name: String,
    pub name_span: Span,
    /// Name through the end of the type annotation, separators excluded.
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct VariableStatement {
    pub keyword: VarKeyword,
    pub keyword_span: Span,
    pub declarators: Vec<Declarator>,
}

#[derive(Debug, Clone)]
pub struct ModuleDecl {
    pub name: String,
    pub name_span: Span,
    pub is_global: bool,
    /// `declare module "spec" { ... }` ambient form.
    pub quoted: bool,
    pub statements: Vec<Statement>,
    /// Span between the body braces; zero when the module has no body.
    pub body_span: Span,
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    Import(ImportDecl),
    ImportEquals(ImportEqualsDecl),
    ExportNamed(ExportNamedDecl),
    ExportStar(ExportStarDecl),
    /// `export default Name;`
    ExportDefaultName { name: String },
    /// `export = Name;`
    ExportAssignment { name: Option<String> },
    Class(DeclName),
    Function(DeclName),
    Enum(DeclName),
    Interface(DeclName),
    TypeAlias(DeclName),
    Module(ModuleDecl),
    Variable(VariableStatement),
    Empty,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    /// Full span including leading trivia.
    pub full_span: Span,
    /// Start of the first token (modifiers included).
    pub start: usize,
    pub modifiers: Vec<Modifier>,
    /// Identifier occurrences inside this statement, nested module bodies
    /// excluded (walk their own statements).
    pub refs: Vec<IdentRef>,
    pub import_types: Vec<ImportTypeRef>,
}

impl Statement {
    pub fn has_modifier(&self, kind: ModifierKind) -> bool {
        self.modifiers.iter().any(|m| m.kind == kind)
    }

    pub fn modifier_span(&self, kind: ModifierKind) -> Option<Span> {
        self.modifiers.iter().find(|m| m.kind == kind).map(|m| m.span)
    }

    /// The local name this statement declares, if any.
    pub fn declared_name(&self) -> Option<&str> {
        match &self.kind {
            StatementKind::Class(d)
            | StatementKind::Function(d)
            | StatementKind::Enum(d)
            | StatementKind::Interface(d)
            | StatementKind::TypeAlias(d) => d.name.as_deref(),
            StatementKind::Module(m) if !m.is_global && !m.quoted => Some(&m.name),
            StatementKind::Variable(v) => {
                if v.declarators.len() == 1 {
                    Some(&v.declarators[0].name)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// True for statement kinds that require a `declare` modifier at the top
    /// level. Interfaces and type aliases never take one.
    pub fn needs_declare(&self) -> bool {
        matches!(
            self.kind,
            StatementKind::Class(_)
                | StatementKind::Function(_)
                | StatementKind::Enum(_)
                | StatementKind::Module(_)
                | StatementKind::Variable(_)
        ) && !matches!(&self.kind, StatementKind::Module(m) if m.is_global)
    }
}

/// Parse a declaration file into statement records.
pub fn parse(source: &str) -> SourceFile {
    Parser::new(source).parse_source_file()
}

struct Parser<'a> {
    scanner: Scanner<'a>,
    source: &'a str,
    /// End offset of the most recently consumed token.
    last_end: usize,
}

/// Tokens after which an identifier is a member or parameter name rather
/// than a reference.
const MEMBER_MODIFIERS: &[SyntaxKind] = &[
    SyntaxKind::PrivateKeyword,
    SyntaxKind::ProtectedKeyword,
    SyntaxKind::PublicKeyword,
    SyntaxKind::StaticKeyword,
    SyntaxKind::AbstractKeyword,
    SyntaxKind::ReadonlyKeyword,
    SyntaxKind::AsyncKeyword,
    SyntaxKind::GetKeyword,
    SyntaxKind::SetKeyword,
    SyntaxKind::NewKeyword,
];

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Parser {
            scanner: Scanner::new(source),
            source,
            last_end: 0,
        }
    }

    fn token(&self) -> SyntaxKind {
        self.scanner.token()
    }

    fn value(&self) -> String {
        self.scanner.token_value().to_string()
    }

    fn start(&self) -> usize {
        self.scanner.token_start()
    }

    fn end(&self) -> usize {
        self.scanner.token_end()
    }

    fn token_span(&self) -> Span {
        Span::new(self.scanner.token_start(), self.scanner.token_end())
    }

    fn bump(&mut self) {
        self.last_end = self.scanner.token_end();
        self.scanner.scan();
    }

    fn eat(&mut self, kind: SyntaxKind) -> bool {
        if self.token() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Consume the current token and return a span covering it plus its
    /// trailing whitespace (up to the next token). Used for modifier and
    /// `type`-marker deletion.
    fn consume_with_gap(&mut self) -> Span {
        let start = self.start();
        self.bump();
        Span::new(start, self.start())
    }

    fn lookahead<T>(&mut self, f: impl FnOnce(&mut Parser<'a>) -> T) -> T {
        let saved_scanner = self.scanner.clone();
        let saved_end = self.last_end;
        let result = f(self);
        self.scanner = saved_scanner;
        self.last_end = saved_end;
        result
    }

    fn parse_source_file(mut self) -> SourceFile {
        let mut statements = Vec::new();
        while self.token() != SyntaxKind::EndOfFile {
            let before = self.start();
            statements.push(self.parse_statement());
            // Any statement must make progress; drop a stray token if not.
            if self.token() != SyntaxKind::EndOfFile && self.start() == before {
                self.bump();
            }
        }
        SourceFile {
            statements,
            trailing_start: self.last_end,
            len: self.source.len(),
        }
    }

    fn parse_statement(&mut self) -> Statement {
        let full_start = self.scanner.full_start();
        let start = self.start();
        let mut modifiers: Vec<Modifier> = Vec::new();
        let mut refs: Vec<IdentRef> = Vec::new();
        let mut import_types: Vec<ImportTypeRef> = Vec::new();

        // Modifier loop. `export` may also introduce a clause statement
        // (`export { .. }`, `export * from`, `export =`), which is decided by
        // the token that follows.
        let kind = loop {
            match self.token() {
                SyntaxKind::ExportKeyword => {
                    modifiers.push(Modifier {
                        kind: ModifierKind::Export,
                        span: self.consume_with_gap(),
                    });
                }
                SyntaxKind::DefaultKeyword if last_is(&modifiers, ModifierKind::Export) => {
                    modifiers.push(Modifier {
                        kind: ModifierKind::Default,
                        span: self.consume_with_gap(),
                    });
                }
                SyntaxKind::DeclareKeyword => {
                    modifiers.push(Modifier {
                        kind: ModifierKind::Declare,
                        span: self.consume_with_gap(),
                    });
                }
                SyntaxKind::AbstractKeyword => {
                    modifiers.push(Modifier {
                        kind: ModifierKind::Abstract,
                        span: self.consume_with_gap(),
                    });
                }
                SyntaxKind::AsyncKeyword
                    if self.lookahead(|p| {
                        p.bump();
                        p.token() == SyntaxKind::FunctionKeyword
                    }) =>
                {
                    modifiers.push(Modifier {
                        kind: ModifierKind::Async,
                        span: self.consume_with_gap(),
                    });
                }
                SyntaxKind::ConstKeyword
                    if self.lookahead(|p| {
                        p.bump();
                        p.token() == SyntaxKind::EnumKeyword
                    }) =>
                {
                    modifiers.push(Modifier {
                        kind: ModifierKind::Const,
                        span: self.consume_with_gap(),
                    });
                }
                _ => break self.parse_statement_kind(&modifiers, &mut refs, &mut import_types),
            }
        };

        Statement {
            kind,
            full_span: Span::new(full_start, self.last_end),
            start,
            modifiers,
            refs,
            import_types,
        }
    }

    fn parse_statement_kind(
        &mut self,
        modifiers: &[Modifier],
        refs: &mut Vec<IdentRef>,
        import_types: &mut Vec<ImportTypeRef>,
    ) -> StatementKind {
        let has_export = modifiers.iter().any(|m| m.kind == ModifierKind::Export);
        let has_default = modifiers.iter().any(|m| m.kind == ModifierKind::Default);
        match self.token() {
            SyntaxKind::ImportKeyword => self.parse_import(),
            SyntaxKind::ClassKeyword => {
                StatementKind::Class(self.parse_class_like(refs, import_types))
            }
            SyntaxKind::InterfaceKeyword => {
                StatementKind::Interface(self.parse_class_like(refs, import_types))
            }
            SyntaxKind::FunctionKeyword => {
                StatementKind::Function(self.parse_function(refs, import_types))
            }
            SyntaxKind::EnumKeyword => StatementKind::Enum(self.parse_enum(refs, import_types)),
            SyntaxKind::TypeKeyword => {
                // `export type { .. }` / `export type * from` vs a type alias.
                let clause = has_export
                    && self.lookahead(|p| {
                        p.bump();
                        matches!(p.token(), SyntaxKind::OpenBrace | SyntaxKind::Asterisk)
                    });
                if clause {
                    let type_span = self.consume_with_gap();
                    if self.token() == SyntaxKind::Asterisk {
                        self.parse_export_star(Some(type_span))
                    } else {
                        self.parse_export_named(Some(type_span))
                    }
                } else {
                    StatementKind::TypeAlias(self.parse_type_alias(refs, import_types))
                }
            }
            SyntaxKind::NamespaceKeyword | SyntaxKind::ModuleKeyword | SyntaxKind::GlobalKeyword => {
                StatementKind::Module(self.parse_module(refs))
            }
            SyntaxKind::ConstKeyword | SyntaxKind::LetKeyword | SyntaxKind::VarKeyword => {
                self.parse_variable(refs, import_types)
            }
            SyntaxKind::OpenBrace if has_export => self.parse_export_named(None),
            SyntaxKind::Asterisk if has_export => self.parse_export_star(None),
            SyntaxKind::Equals if has_export => {
                self.bump();
                let name = if self.token().is_identifier_like() {
                    let name = self.value();
                    self.bump();
                    Some(name)
                } else {
                    None
                };
                self.skip_to_semicolon(refs, import_types);
                StatementKind::ExportAssignment { name }
            }
            SyntaxKind::Identifier if has_default => {
                let name = self.value();
                self.bump();
                self.eat(SyntaxKind::Semicolon);
                StatementKind::ExportDefaultName { name }
            }
            SyntaxKind::Semicolon => {
                self.bump();
                StatementKind::Empty
            }
            SyntaxKind::EndOfFile => StatementKind::Empty,
            _ => {
                self.skip_to_semicolon(refs, import_types);
                StatementKind::Unknown
            }
        }
    }

    fn parse_import(&mut self) -> StatementKind {
        self.bump(); // import

        // Side-effect import: `import "spec";`
        if self.token() == SyntaxKind::StringLiteral {
            let specifier = self.value();
            let specifier_span = self.token_span();
            self.bump();
            self.eat(SyntaxKind::Semicolon);
            return StatementKind::Import(ImportDecl {
                type_span: None,
                default_name: None,
                namespace_name: None,
                named: None,
                specifier,
                specifier_span,
            });
        }

        // Leading `import type` marker. `import type from "x"` binds a
        // default named `type` instead.
        let mut type_span = None;
        if self.token() == SyntaxKind::TypeKeyword {
            let is_marker = self.lookahead(|p| {
                p.bump();
                match p.token() {
                    SyntaxKind::OpenBrace | SyntaxKind::Asterisk => true,
                    t if t.is_identifier_like() => t != SyntaxKind::FromKeyword,
                    _ => false,
                }
            });
            if is_marker {
                type_span = Some(self.consume_with_gap());
            }
        }

        let mut default_name = None;
        let mut namespace_name = None;
        let mut named = None;

        if self.token().is_identifier_like()
            && !matches!(self.token(), SyntaxKind::Asterisk | SyntaxKind::OpenBrace)
        {
            let name = self.value();
            let span = self.token_span();
            self.bump();

            // `import Name = require("spec");`
            if self.token() == SyntaxKind::Equals && type_span.is_none() {
                self.bump();
                if self.eat(SyntaxKind::RequireKeyword) && self.eat(SyntaxKind::OpenParen) {
                    if self.token() == SyntaxKind::StringLiteral {
                        let specifier = self.value();
                        let specifier_span = self.token_span();
                        self.bump();
                        self.eat(SyntaxKind::CloseParen);
                        self.eat(SyntaxKind::Semicolon);
                        return StatementKind::ImportEquals(ImportEqualsDecl {
                            name,
                            specifier,
                            specifier_span,
                        });
                    }
                    self.eat(SyntaxKind::CloseParen);
                }
                self.eat(SyntaxKind::Semicolon);
                return StatementKind::Unknown;
            }

            default_name = Some((name, span));
            self.eat(SyntaxKind::Comma);
        }

        if self.token() == SyntaxKind::Asterisk {
            self.bump();
            self.eat(SyntaxKind::AsKeyword);
            if self.token().is_identifier_like() {
                namespace_name = Some((self.value(), self.token_span()));
                self.bump();
            }
        } else if self.token() == SyntaxKind::OpenBrace {
            named = Some(self.parse_import_specifiers());
        }

        let (specifier, specifier_span) = if self.eat(SyntaxKind::FromKeyword)
            && self.token() == SyntaxKind::StringLiteral
        {
            let spec = self.value();
            let span = self.token_span();
            self.bump();
            (spec, span)
        } else {
            (String::new(), Span::default())
        };
        self.eat(SyntaxKind::Semicolon);

        StatementKind::Import(ImportDecl {
            type_span,
            default_name,
            namespace_name,
            named,
            specifier,
            specifier_span,
        })
    }

    fn parse_import_specifiers(&mut self) -> Vec<ImportSpecifier> {
        let mut elements = Vec::new();
        self.bump(); // {
        while !matches!(self.token(), SyntaxKind::CloseBrace | SyntaxKind::EndOfFile) {
            let mut type_span = None;
            if self.token() == SyntaxKind::TypeKeyword {
                let is_marker = self.lookahead(|p| {
                    p.bump();
                    p.token().is_identifier_like() && p.token() != SyntaxKind::AsKeyword
                });
                if is_marker {
                    type_span = Some(self.consume_with_gap());
                }
            }
            if !self.token().is_identifier_like() {
                self.bump();
                continue;
            }
            let first = self.value();
            let first_span = self.token_span();
            self.bump();
            let (property_name, name, name_span) = if self.token() == SyntaxKind::AsKeyword {
                self.bump();
                let local = self.value();
                let local_span = self.token_span();
                self.bump();
                (Some(first), local, local_span)
            } else {
                (None, first, first_span)
            };
            elements.push(ImportSpecifier {
                type_span,
                property_name,
                name,
                name_span,
            });
            if !self.eat(SyntaxKind::Comma) && self.token() != SyntaxKind::CloseBrace {
                break;
            }
        }
        self.eat(SyntaxKind::CloseBrace);
        elements
    }

    fn parse_export_named(&mut self, type_span: Option<Span>) -> StatementKind {
        let mut elements = Vec::new();
        self.bump(); // {
        while !matches!(self.token(), SyntaxKind::CloseBrace | SyntaxKind::EndOfFile) {
            if !self.token().is_identifier_like() {
                self.bump();
                continue;
            }
            let local = self.value();
            let local_span = self.token_span();
            self.bump();
            let exported = if self.token() == SyntaxKind::AsKeyword {
                self.bump();
                let name = self.value();
                self.bump();
                Some(name)
            } else {
                None
            };
            elements.push(ExportSpecifier {
                local,
                local_span,
                exported,
                span: Span::new(local_span.start, self.last_end),
            });
            if !self.eat(SyntaxKind::Comma) && self.token() != SyntaxKind::CloseBrace {
                break;
            }
        }
        self.eat(SyntaxKind::CloseBrace);

        let (specifier, specifier_span) = if self.eat(SyntaxKind::FromKeyword)
            && self.token() == SyntaxKind::StringLiteral
        {
            let spec = self.value();
            let span = self.token_span();
            self.bump();
            (Some(spec), Some(span))
        } else {
            (None, None)
        };
        self.eat(SyntaxKind::Semicolon);

        StatementKind::ExportNamed(ExportNamedDecl {
            type_span,
            elements,
            specifier,
            specifier_span,
        })
    }

    fn parse_export_star(&mut self, type_span: Option<Span>) -> StatementKind {
        self.bump(); // *
        let namespace = if self.eat(SyntaxKind::AsKeyword) {
            let name = self.value();
            self.bump();
            Some(name)
        } else {
            None
        };
        let (specifier, specifier_span) = if self.eat(SyntaxKind::FromKeyword)
            && self.token() == SyntaxKind::StringLiteral
        {
            let spec = self.value();
            let span = self.token_span();
            self.bump();
            (spec, span)
        } else {
            (String::new(), Span::default())
        };
        self.eat(SyntaxKind::Semicolon);
        StatementKind::ExportStar(ExportStarDecl {
            type_span,
            namespace,
            specifier,
            specifier_span,
        })
    }

    fn parse_decl_name(&mut self) -> DeclName {
        let name_insert_pos = self.end();
        self.bump(); // declaration keyword
        let (name, name_span) = if self.token().is_identifier_like() {
            let name = self.value();
            let span = self.token_span();
            self.bump();
            (Some(name), Some(span))
        } else {
            (None, None)
        };
        DeclName {
            name,
            name_span,
            name_insert_pos,
        }
    }

    /// Class and interface declarations: name, type parameters, heritage,
    /// brace body.
    fn parse_class_like(
        &mut self,
        refs: &mut Vec<IdentRef>,
        import_types: &mut Vec<ImportTypeRef>,
    ) -> DeclName {
        let decl = self.parse_decl_name();
        if let (Some(name), Some(span)) = (&decl.name, decl.name_span) {
            refs.push(IdentRef {
                name: name.clone(),
                span,
            });
        }
        // Type parameters and heritage up to the body brace.
        self.scan_region(&[SyntaxKind::OpenBrace], false, refs, import_types);
        self.scan_braced_body(refs, import_types);
        decl
    }

    fn parse_function(
        &mut self,
        refs: &mut Vec<IdentRef>,
        import_types: &mut Vec<ImportTypeRef>,
    ) -> DeclName {
        let decl = self.parse_decl_name();
        if let (Some(name), Some(span)) = (&decl.name, decl.name_span) {
            refs.push(IdentRef {
                name: name.clone(),
                span,
            });
        }
        // Signature through the terminating semicolon. Ambient functions have
        // no body; an unexpected close brace ends the enclosing block.
        self.scan_region(&[SyntaxKind::Semicolon], true, refs, import_types);
        decl
    }

    fn parse_enum(
        &mut self,
        refs: &mut Vec<IdentRef>,
        import_types: &mut Vec<ImportTypeRef>,
    ) -> DeclName {
        let decl = self.parse_decl_name();
        if let (Some(name), Some(span)) = (&decl.name, decl.name_span) {
            refs.push(IdentRef {
                name: name.clone(),
                span,
            });
        }
        self.scan_braced_body(refs, import_types);
        self.eat(SyntaxKind::Semicolon);
        decl
    }

    fn parse_type_alias(
        &mut self,
        refs: &mut Vec<IdentRef>,
        import_types: &mut Vec<ImportTypeRef>,
    ) -> DeclName {
        let decl = self.parse_decl_name();
        if let (Some(name), Some(span)) = (&decl.name, decl.name_span) {
            refs.push(IdentRef {
                name: name.clone(),
                span,
            });
        }
        // Type parameters; defaults keep `=` above depth zero.
        self.scan_region(&[SyntaxKind::Equals], false, refs, import_types);
        self.eat(SyntaxKind::Equals);
        self.scan_region(&[SyntaxKind::Semicolon], true, refs, import_types);
        decl
    }

    fn parse_module(&mut self, refs: &mut Vec<IdentRef>) -> ModuleDecl {
        let is_global = self.token() == SyntaxKind::GlobalKeyword;
        let mut quoted = false;
        let (name, name_span) = if is_global {
            let span = self.token_span();
            let name = self.value();
            self.bump();
            (name, span)
        } else {
            self.bump(); // namespace / module
            if self.token() == SyntaxKind::StringLiteral {
                quoted = true;
                let name = self.value();
                let span = self.token_span();
                self.bump();
                (name, span)
            } else if self.token().is_identifier_like() {
                let name = self.value();
                let span = self.token_span();
                refs.push(IdentRef {
                    name: name.clone(),
                    span,
                });
                self.bump();
                // Dotted namespace names declare the first segment.
                while self.token() == SyntaxKind::Dot {
                    self.bump();
                    if self.token().is_identifier_like() {
                        self.bump();
                    }
                }
                (name, span)
            } else {
                (String::new(), self.token_span())
            }
        };

        let mut statements = Vec::new();
        let mut body_span = Span::default();
        if self.token() == SyntaxKind::OpenBrace {
            let body_start = self.end();
            self.bump();
            while !matches!(self.token(), SyntaxKind::CloseBrace | SyntaxKind::EndOfFile) {
                let before = self.start();
                statements.push(self.parse_statement());
                if self.token() != SyntaxKind::EndOfFile && self.start() == before {
                    self.bump();
                }
            }
            body_span = Span::new(body_start, self.start());
            self.eat(SyntaxKind::CloseBrace);
        } else {
            self.eat(SyntaxKind::Semicolon);
        }

        ModuleDecl {
            name,
            name_span,
            is_global,
            quoted,
            statements,
            body_span,
        }
    }

    fn parse_variable(
        &mut self,
        refs: &mut Vec<IdentRef>,
        import_types: &mut Vec<ImportTypeRef>,
    ) -> StatementKind {
        let keyword = match self.token() {
            SyntaxKind::ConstKeyword => VarKeyword::Const,
            SyntaxKind::LetKeyword => VarKeyword::Let,
            _ => VarKeyword::Var,
        };
        let keyword_span = self.token_span();
        self.bump();

        if !self.token().is_identifier_like() {
            // Destructuring patterns do not occur in emitted declarations.
            self.skip_to_semicolon(refs, import_types);
            return StatementKind::Unknown;
        }

        let mut declarators = Vec::new();
        loop {
            if !self.token().is_identifier_like() {
                break;
            }
            let name = self.value();
            let name_span = self.token_span();
            refs.push(IdentRef {
                name: name.clone(),
                span: name_span,
            });
            self.bump();
            self.eat(SyntaxKind::Question);
            if self.eat(SyntaxKind::Colon) || self.eat(SyntaxKind::Equals) {
                self.scan_region(
                    &[SyntaxKind::Comma, SyntaxKind::Semicolon],
                    false,
                    refs,
                    import_types,
                );
            }
            declarators.push(Declarator {
                name,
                name_span,
                span: Span::new(name_span.start, self.last_end),
            });
            if !self.eat(SyntaxKind::Comma) {
                break;
            }
        }
        self.eat(SyntaxKind::Semicolon);

        StatementKind::Variable(VariableStatement {
            keyword,
            keyword_span,
            declarators,
        })
    }

    fn skip_to_semicolon(
        &mut self,
        refs: &mut Vec<IdentRef>,
        import_types: &mut Vec<ImportTypeRef>,
    ) {
        self.scan_region(&[SyntaxKind::Semicolon], true, refs, import_types);
    }

    /// Bracket-balanced token walk collecting identifier references and
    /// inline import types.
    ///
    /// Stops at the first `terminators` token at depth zero (consumed when
    /// `consume_terminator`), at a depth-zero close brace that is not on the
    /// terminator list (unconsumed, it belongs to an enclosing block), or at
    /// the end of file.
    fn scan_region(
        &mut self,
        terminators: &[SyntaxKind],
        consume_terminator: bool,
        refs: &mut Vec<IdentRef>,
        import_types: &mut Vec<ImportTypeRef>,
    ) {
        self.scan_region_impl(terminators, consume_terminator, false, refs, import_types);
    }

    /// A `{ ... }` body: consumes the braces and walks the members. The open
    /// brace is seeded onto the bracket stack so member names at body level
    /// classify as property keys, not references.
    fn scan_braced_body(&mut self, refs: &mut Vec<IdentRef>, import_types: &mut Vec<ImportTypeRef>) {
        if self.eat(SyntaxKind::OpenBrace) {
            self.scan_region_impl(&[], false, true, refs, import_types);
        }
    }

    fn scan_region_impl(
        &mut self,
        terminators: &[SyntaxKind],
        consume_terminator: bool,
        seeded_brace: bool,
        refs: &mut Vec<IdentRef>,
        import_types: &mut Vec<ImportTypeRef>,
    ) {
        let mut stack: Vec<SyntaxKind> = if seeded_brace {
            vec![SyntaxKind::OpenBrace]
        } else {
            Vec::new()
        };
        let mut prev = if seeded_brace {
            SyntaxKind::OpenBrace
        } else {
            SyntaxKind::Unknown
        };
        // A candidate reference is held back one token: an identifier in
        // parameter position is only recognizable once the `:` or `?` after
        // it is seen.
        let mut pending: Option<IdentRef> = None;

        loop {
            let token = self.token();

            if stack.is_empty() {
                if terminators.contains(&token) {
                    if let Some(r) = pending.take() {
                        refs.push(r);
                    }
                    if consume_terminator {
                        self.bump();
                    }
                    return;
                }
                if token == SyntaxKind::CloseBrace || token == SyntaxKind::EndOfFile {
                    if let Some(r) = pending.take() {
                        refs.push(r);
                    }
                    return;
                }
            }

            // Commit or drop the held-back candidate now that its following
            // token is known.
            if let Some(r) = pending.take() {
                if !matches!(token, SyntaxKind::Colon | SyntaxKind::Question) {
                    refs.push(r);
                }
            }

            match token {
                SyntaxKind::OpenBrace
                | SyntaxKind::OpenParen
                | SyntaxKind::OpenBracket
                | SyntaxKind::LessThan => {
                    stack.push(token);
                    prev = token;
                    self.bump();
                }
                SyntaxKind::CloseBrace => {
                    if stack.last() == Some(&SyntaxKind::OpenBrace) {
                        stack.pop();
                        if seeded_brace && stack.is_empty() {
                            // End of the seeded body.
                            self.bump();
                            return;
                        }
                    }
                    prev = token;
                    self.bump();
                }
                SyntaxKind::CloseParen => {
                    if stack.last() == Some(&SyntaxKind::OpenParen) {
                        stack.pop();
                    }
                    prev = token;
                    self.bump();
                }
                SyntaxKind::CloseBracket => {
                    if stack.last() == Some(&SyntaxKind::OpenBracket) {
                        stack.pop();
                    }
                    prev = token;
                    self.bump();
                }
                SyntaxKind::GreaterThan => {
                    if stack.last() == Some(&SyntaxKind::LessThan) {
                        stack.pop();
                    }
                    prev = token;
                    self.bump();
                }
                SyntaxKind::ImportKeyword => {
                    self.scan_import_type(&mut stack, import_types);
                    prev = SyntaxKind::CloseParen;
                }
                SyntaxKind::Identifier => {
                    let candidate = self.classify_reference(prev, &stack);
                    if candidate {
                        let in_params = stack.last() == Some(&SyntaxKind::OpenParen)
                            && matches!(
                                prev,
                                SyntaxKind::OpenParen | SyntaxKind::Comma | SyntaxKind::DotDotDot
                            );
                        let r = IdentRef {
                            name: self.value(),
                            span: self.token_span(),
                        };
                        if in_params {
                            pending = Some(r);
                        } else {
                            refs.push(r);
                        }
                    }
                    prev = token;
                    self.bump();
                }
                SyntaxKind::EndOfFile => return,
                other => {
                    prev = other;
                    self.bump();
                }
            }
        }
    }

    /// Inline `import("spec")`: records the span through the closing paren.
    /// A non-literal argument is recorded with no specifier; the processor
    /// rejects it. Assumes the current token is `import`.
    fn scan_import_type(
        &mut self,
        stack: &mut Vec<SyntaxKind>,
        import_types: &mut Vec<ImportTypeRef>,
    ) {
        let start = self.start();
        self.bump();
        if self.token() != SyntaxKind::OpenParen {
            return;
        }
        self.bump();
        if self.token() == SyntaxKind::StringLiteral {
            let specifier = self.value();
            self.bump();
            if self.token() == SyntaxKind::CloseParen {
                let span = Span::new(start, self.end());
                self.bump();
                import_types.push(ImportTypeRef {
                    specifier: Some(specifier),
                    span,
                });
                return;
            }
        }
        // Unsupported shape; keep the brackets balanced and let the region
        // walk continue past the argument.
        stack.push(SyntaxKind::OpenParen);
        import_types.push(ImportTypeRef {
            specifier: None,
            span: Span::new(start, self.end()),
        });
    }

    /// Is an identifier at this position a reference (as opposed to a member,
    /// parameter, or qualified-name tail)?
    fn classify_reference(&self, prev: SyntaxKind, stack: &[SyntaxKind]) -> bool {
        if prev == SyntaxKind::Dot {
            return false;
        }
        if MEMBER_MODIFIERS.contains(&prev) {
            return false;
        }
        // Property-key position inside a brace body.
        if stack.last() == Some(&SyntaxKind::OpenBrace)
            && matches!(
                prev,
                SyntaxKind::OpenBrace | SyntaxKind::Semicolon | SyntaxKind::Comma
            )
        {
            return false;
        }
        true
    }
}

fn last_is(modifiers: &[Modifier], kind: ModifierKind) -> bool {
    modifiers.last().map(|m| m.kind) == Some(kind)
}
