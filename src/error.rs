//! Build error taxonomy.
//!
//! Each expected failure kind carries the process exit code the binary maps
//! it to. Expected failures are logged at the point of throw; the driver sets
//! the exit code and returns without re-logging.

use std::path::PathBuf;
use thiserror::Error;

/// Exit code for a successful build.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for type-check or generic build failures.
pub const EXIT_BUILD_FAILURE: i32 = 1;
/// Exit code for declaration bundling failures.
pub const EXIT_BUNDLE_FAILURE: i32 = 2;
/// Exit code for configuration failures.
pub const EXIT_CONFIG_FAILURE: i32 = 3;
/// Exit code for uncaught panics.
pub const EXIT_UNCAUGHT: i32 = 99;
/// Exit code for a user interrupt.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Errors surfaced by the build driver.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Compiler emit returned error diagnostics; the build aborts before
    /// bundling.
    #[error("type check failed\n{summary}")]
    TypeCheck { summary: String },

    /// Entry-point declaration not found, unsupported syntax, or a resolver
    /// result missing from the store.
    #[error("declaration bundling failed: {0}")]
    Bundle(String),

    /// Unreadable or invalid project configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The processor met a construct it cannot safely rewrite.
    #[error("unsupported syntax: {message}")]
    UnsupportedSyntax { message: String },

    /// Unexpected I/O failure outside the cache (cache errors are swallowed).
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic build failure (transpiler errors, unexpected state).
    #[error("{0}")]
    Internal(String),
}

impl BuildError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::TypeCheck { .. } => EXIT_BUILD_FAILURE,
            BuildError::Bundle(_) | BuildError::UnsupportedSyntax { .. } => EXIT_BUNDLE_FAILURE,
            BuildError::Configuration(_) => EXIT_CONFIG_FAILURE,
            BuildError::Io { .. } | BuildError::Internal(_) => EXIT_BUILD_FAILURE,
        }
    }

    /// Wrap a declaration-branch failure as a bundle error, preserving
    /// already-classified kinds.
    pub fn into_bundle(self) -> Self {
        match self {
            BuildError::UnsupportedSyntax { message } => {
                BuildError::Bundle(format!("unsupported syntax: {message}"))
            }
            BuildError::Io { path, source } => {
                BuildError::Bundle(format!("i/o error on {}: {source}", path.display()))
            }
            other => other,
        }
    }
}
