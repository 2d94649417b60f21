//! Compiler adapter contracts.
//!
//! The TypeScript compiler is an opaque collaborator: it takes root files and
//! emits declarations through a write capability. The driver only depends on
//! these traits; tests and embedders provide the implementation.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::diagnostics::Diagnostic;
use crate::error::BuildError;

/// Write capability handed to the compiler for emitted files.
pub trait DeclarationWriter {
    fn write_file(&mut self, path: &std::path::Path, text: &str) -> Result<(), BuildError>;
}

/// Cooperative cancellation signal, checked at suspension points.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Option bag shared with the resolver.
#[derive(Debug, Clone, Default)]
pub struct CompilerOptions {
    pub out_dir: Option<PathBuf>,
    pub root_dir: Option<PathBuf>,
    pub declaration: bool,
    pub base_url: Option<PathBuf>,
}

/// Inputs for creating the incremental program.
#[derive(Debug, Clone, Default)]
pub struct ProgramOptions {
    pub root_names: Vec<PathBuf>,
    pub compiler_options: CompilerOptions,
    pub project_references: Vec<PathBuf>,
    pub config_file_parsing_diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Default)]
pub struct EmitResult {
    pub diagnostics: Vec<Diagnostic>,
}

/// The opaque incremental compiler.
pub trait Compiler {
    /// Emit declaration files through `writer`. Calls into the writer are
    /// serialized; diagnostics of error severity abort the build.
    fn emit(
        &mut self,
        writer: &mut dyn DeclarationWriter,
        cancel: &CancelToken,
        emit_only_dts_files: bool,
    ) -> EmitResult;
}

/// Adapter over a directory of declarations already emitted by
/// `tsc --emitDeclarationOnly`. The binary uses this; embedders with an
/// in-process compiler provide their own [`Compiler`].
#[derive(Debug)]
pub struct DeclarationDirCompiler {
    root: PathBuf,
}

impl DeclarationDirCompiler {
    pub fn new(root: PathBuf) -> Self {
        DeclarationDirCompiler { root }
    }
}

impl Compiler for DeclarationDirCompiler {
    fn emit(
        &mut self,
        writer: &mut dyn DeclarationWriter,
        cancel: &CancelToken,
        _emit_only_dts_files: bool,
    ) -> EmitResult {
        use crate::diagnostics::DiagnosticCategory;

        let mut diagnostics = Vec::new();
        let walker = walkdir::WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok());
        for entry in walker {
            if cancel.is_cancelled() {
                break;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !(name.ends_with(".d.ts") || name.ends_with(".d.tsx")) {
                continue;
            }
            let path = entry.path();
            let outcome = std::fs::read_to_string(path)
                .map_err(|err| err.to_string())
                .and_then(|text| {
                    writer
                        .write_file(path, &text)
                        .map_err(|err| err.to_string())
                });
            if let Err(message) = outcome {
                diagnostics.push(Diagnostic {
                    file: Some(path.to_path_buf()),
                    line: 1,
                    column: 1,
                    code: 0,
                    category: DiagnosticCategory::Error,
                    message,
                });
            }
        }
        EmitResult { diagnostics }
    }
}
