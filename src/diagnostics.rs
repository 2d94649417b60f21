//! Compiler diagnostics and the type-check failure summary.

use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCategory {
    Error,
    Warning,
    Message,
}

/// One diagnostic reported by the compiler adapter. Line and column are
/// one-based.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub file: Option<PathBuf>,
    pub line: u32,
    pub column: u32,
    pub code: u32,
    pub category: DiagnosticCategory,
    pub message: String,
}

impl Diagnostic {
    pub fn error(
        file: impl Into<PathBuf>,
        line: u32,
        column: u32,
        code: u32,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            file: Some(file.into()),
            line,
            column,
            code,
            category: DiagnosticCategory::Error,
            message: message.into(),
        }
    }
}

pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics
        .iter()
        .any(|d| d.category == DiagnosticCategory::Error)
}

/// Per-file summary with the first error's location, for the TypeCheck
/// failure output.
pub fn format_summary(diagnostics: &[Diagnostic]) -> String {
    let errors: Vec<&Diagnostic> = diagnostics
        .iter()
        .filter(|d| d.category == DiagnosticCategory::Error)
        .collect();

    let mut per_file: BTreeMap<String, Vec<&Diagnostic>> = BTreeMap::new();
    let mut no_file: Vec<&Diagnostic> = Vec::new();
    for diag in &errors {
        match &diag.file {
            Some(file) => per_file
                .entry(file.display().to_string())
                .or_default()
                .push(diag),
            None => no_file.push(diag),
        }
    }

    let mut out = String::new();
    for (file, diags) in &per_file {
        let first = diags[0];
        out.push_str(&format!(
            "{file}: {} error{} (first TS{} at {}:{}: {})\n",
            diags.len(),
            if diags.len() == 1 { "" } else { "s" },
            first.code,
            first.line,
            first.column,
            first.message
        ));
    }
    for diag in &no_file {
        out.push_str(&format!("TS{}: {}\n", diag.code, diag.message));
    }
    out.push_str(&format!(
        "{} error{} in {} file{}",
        errors.len(),
        if errors.len() == 1 { "" } else { "s" },
        per_file.len(),
        if per_file.len() == 1 { "" } else { "s" },
    ));
    out
}
