//! Project configuration loading.
//!
//! `tsbundle.json` in the project root configures entries, directories,
//! externals, and transpiler options. Unreadable or invalid configuration is
//! a `Configuration` failure (exit 3). A missing file falls back to defaults.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::compiler::CompilerOptions;
use crate::error::BuildError;
use crate::pattern::Pattern;
use crate::transpiler::{compute_define, Platform, TranspileOptions};

pub const CONFIG_FILE_NAME: &str = "tsbundle.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ProjectConfig {
    /// Entry name to source path. Defaults to `index` → `src/index.ts`.
    pub entry: BTreeMap<String, String>,
    pub out_dir: String,
    /// Where the compiler emitted raw declarations; defaults to `outDir`.
    pub declaration_dir: Option<String>,
    pub root_dir: Option<String>,
    /// Emit a bundled declaration per entry point.
    pub declaration: bool,
    /// Specifiers kept as imports in the bundled declaration.
    pub external: Vec<String>,
    /// node_modules packages whose declarations are inlined anyway.
    pub no_external: Vec<String>,
    /// Allow reading declarations from disk for modules outside the store.
    pub resolve: bool,
    /// Persist pre-processed declarations between runs.
    pub cache: bool,
    /// Empty the output directory before writing.
    pub clean: bool,
    pub platform: Platform,
    pub target: Option<String>,
    pub bundle: bool,
    pub splitting: bool,
    pub minify: bool,
    pub source_map: bool,
    pub banner: Option<String>,
    pub footer: Option<String>,
    /// Expanded into the transpiler `define` map as `import.meta.env.*`.
    pub env: BTreeMap<String, String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        ProjectConfig {
            entry: BTreeMap::new(),
            out_dir: "dist".to_string(),
            declaration_dir: None,
            root_dir: Some("src".to_string()),
            declaration: true,
            external: Vec::new(),
            no_external: Vec::new(),
            resolve: false,
            cache: true,
            clean: false,
            platform: Platform::default(),
            target: None,
            bundle: true,
            splitting: false,
            minify: false,
            source_map: false,
            banner: None,
            footer: None,
            env: BTreeMap::new(),
        }
    }
}

/// Fully resolved options the driver consumes.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub project_dir: PathBuf,
    pub entry_points: BTreeMap<String, PathBuf>,
    /// CLI-selected entry names; `None` means the default selection.
    pub selected_entry_points: Option<Vec<String>>,
    pub out_dir: PathBuf,
    /// Directory the binary's disk-backed compiler adapter scans.
    pub declaration_dir: PathBuf,
    pub compiler_options: CompilerOptions,
    pub declaration: bool,
    /// Suppress transpiled output.
    pub no_emit: bool,
    pub clean: bool,
    pub cache: bool,
    pub resolve: bool,
    pub external: Vec<Pattern>,
    pub no_external: Vec<Pattern>,
    pub transpile: TranspileOptions,
}

/// Load `tsbundle.json` from a project directory (or an explicit file path).
/// A missing file yields the default configuration.
pub fn load_config(project: &Path) -> Result<(PathBuf, ProjectConfig), BuildError> {
    let (project_dir, config_path) = if project.is_file() {
        (
            project
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
            project.to_path_buf(),
        )
    } else {
        (project.to_path_buf(), project.join(CONFIG_FILE_NAME))
    };

    if !config_path.exists() {
        return Ok((project_dir, ProjectConfig::default()));
    }
    let text = std::fs::read_to_string(&config_path).map_err(|err| {
        BuildError::Configuration(format!("cannot read {}: {err}", config_path.display()))
    })?;
    let config: ProjectConfig = serde_json::from_str(&text).map_err(|err| {
        BuildError::Configuration(format!("invalid {}: {err}", config_path.display()))
    })?;
    Ok((project_dir, config))
}

impl ProjectConfig {
    /// Resolve paths and patterns into driver options.
    pub fn into_build_options(self, project_dir: &Path) -> Result<BuildOptions, BuildError> {
        let parse_patterns = |list: &[String]| -> Result<Vec<Pattern>, BuildError> {
            list.iter()
                .map(|text| {
                    Pattern::parse(text).map_err(|err| {
                        BuildError::Configuration(format!("invalid pattern {text:?}: {err}"))
                    })
                })
                .collect()
        };
        let external = parse_patterns(&self.external)?;
        let no_external = parse_patterns(&self.no_external)?;

        let mut entry_points: BTreeMap<String, PathBuf> = self
            .entry
            .iter()
            .map(|(name, path)| (name.clone(), project_dir.join(path)))
            .collect();
        if entry_points.is_empty() {
            entry_points.insert("index".to_string(), project_dir.join("src/index.ts"));
        }

        let out_dir = project_dir.join(&self.out_dir);
        let declaration_dir = self
            .declaration_dir
            .as_ref()
            .map(|d| project_dir.join(d))
            .unwrap_or_else(|| out_dir.clone());
        // Entry translation and resolution work against the directory the
        // compiler emitted declarations into.
        let compiler_options = CompilerOptions {
            out_dir: Some(declaration_dir.clone()),
            root_dir: self.root_dir.as_ref().map(|r| project_dir.join(r)),
            declaration: self.declaration,
            base_url: None,
        };
        let transpile = TranspileOptions {
            platform: self.platform,
            target: self.target.clone(),
            bundle: self.bundle,
            splitting: self.splitting,
            minify: self.minify,
            source_map: self.source_map,
            banner: self.banner.clone(),
            footer: self.footer.clone(),
            out_dir: out_dir.clone(),
            define: compute_define(&self.env),
        };

        Ok(BuildOptions {
            project_dir: project_dir.to_path_buf(),
            entry_points,
            selected_entry_points: None,
            out_dir,
            declaration_dir,
            compiler_options,
            declaration: self.declaration,
            no_emit: false,
            clean: self.clean,
            cache: self.cache,
            resolve: self.resolve,
            external,
            no_external,
            transpile,
        })
    }
}
