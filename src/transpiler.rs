//! Transpiler adapter contracts.
//!
//! JavaScript transpilation is an opaque collaborator; the driver only
//! schedules it next to declaration bundling and forwards options. The one
//! piece of real logic owned here is the `define` map: config `env` entries
//! have `${process.env.X}` placeholders expanded against the ambient process
//! environment, and each value is serialized as a string literal keyed
//! `import.meta.env.<KEY>`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::BuildError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Node,
    Browser,
    Neutral,
}

#[derive(Debug, Clone, Default)]
pub struct TranspileOptions {
    pub platform: Platform,
    pub target: Option<String>,
    pub bundle: bool,
    pub splitting: bool,
    pub minify: bool,
    pub source_map: bool,
    pub banner: Option<String>,
    pub footer: Option<String>,
    pub out_dir: PathBuf,
    pub define: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct TranspileRequest {
    /// `(name, source path)` per entry point.
    pub entry_points: Vec<(String, PathBuf)>,
    pub options: TranspileOptions,
}

#[derive(Debug, Clone)]
pub struct OutputFile {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Default)]
pub struct TranspileResult {
    pub output_files: Vec<OutputFile>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// `Sync` because the transpile task runs beside declaration bundling.
pub trait Transpiler: Sync {
    fn transpile(&self, request: &TranspileRequest) -> Result<TranspileResult, BuildError>;
}

static ENV_PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{process\.env\.([A-Za-z_][A-Za-z0-9_]*)\}").expect("env regex"));

/// Build the transpiler `define` map from the config `env` table.
pub fn compute_define(env: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    env.iter()
        .map(|(key, value)| {
            let expanded = ENV_PLACEHOLDER_RE.replace_all(value, |caps: &regex::Captures<'_>| {
                std::env::var(&caps[1]).unwrap_or_default()
            });
            let literal = serde_json::to_string(expanded.as_ref())
                .unwrap_or_else(|_| "\"\"".to_string());
            (format!("import.meta.env.{key}"), literal)
        })
        .collect()
}
