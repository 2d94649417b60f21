//! Build orchestration.
//!
//! One end-to-end build: initialize the store, run compiler emit through the
//! write callback, gate on the incremental no-op check, then bundle
//! declarations and transpile concurrently. Both concurrent tasks run to
//! completion before the first error propagates; the declaration branch is
//! surfaced as a bundle failure.

use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, info_span, warn};

use crate::cache::DeclarationCache;
use crate::cleanup::CleanupRegistry;
use crate::compiler::{CancelToken, Compiler};
use crate::composer::compose_bundle;
use crate::config::BuildOptions;
use crate::diagnostics::{format_summary, has_errors};
use crate::error::BuildError;
use crate::fs::{empty_dir, write_atomic};
use crate::graph::{build_module_graph, GraphOptions};
use crate::resolver::Resolver;
use crate::store::DeclarationStore;
use crate::transpiler::{TranspileRequest, Transpiler};

/// One bundled declaration written to disk.
#[derive(Debug)]
pub struct BundleOutput {
    pub name: String,
    pub path: PathBuf,
    pub exports: Vec<String>,
    pub size: u64,
}

#[derive(Debug, Default)]
pub struct BuildSummary {
    /// True when nothing was emitted since the last build; no outputs were
    /// produced.
    pub no_op: bool,
    pub bundles: Vec<BundleOutput>,
}

pub struct Builder<'a> {
    options: &'a BuildOptions,
    compiler: &'a mut dyn Compiler,
    transpiler: Option<&'a dyn Transpiler>,
    resolver: &'a dyn Resolver,
    store: DeclarationStore,
    cancel: CancelToken,
    cleanup: &'a CleanupRegistry,
}

impl<'a> Builder<'a> {
    pub fn new(
        options: &'a BuildOptions,
        compiler: &'a mut dyn Compiler,
        transpiler: Option<&'a dyn Transpiler>,
        resolver: &'a dyn Resolver,
        cleanup: &'a CleanupRegistry,
    ) -> Self {
        let cache = options.cache.then(|| {
            DeclarationCache::new(&options.project_dir, options.out_dir.join(".tsbuildinfo"))
        });
        Builder {
            options,
            compiler,
            transpiler,
            resolver,
            store: DeclarationStore::new(cache),
            cancel: CancelToken::new(),
            cleanup,
        }
    }

    /// Signal for aborting in-flight work at the next suspension point.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &DeclarationStore {
        &self.store
    }

    /// Run one build.
    pub fn build(&mut self) -> Result<BuildSummary, BuildError> {
        let span = info_span!("build");
        let _guard = span.enter();

        self.store.initialize();

        let emit_result = {
            let span = info_span!("emit");
            let _guard = span.enter();
            self.compiler.emit(&mut self.store, &self.cancel, true)
        };
        if has_errors(&emit_result.diagnostics) {
            let summary = format_summary(&emit_result.diagnostics);
            warn!("compiler reported errors; aborting before bundling");
            return Err(BuildError::TypeCheck { summary });
        }

        if !self.store.finalize() {
            info!("nothing emitted since the last build; skipping bundle and transpile");
            return Ok(BuildSummary {
                no_op: true,
                bundles: Vec::new(),
            });
        }

        if self.options.clean {
            empty_dir(&self.options.out_dir)
                .map_err(|err| BuildError::io(&self.options.out_dir, err))?;
        }
        if self.cancel.is_cancelled() {
            return Err(BuildError::Internal("build cancelled".into()));
        }

        let store = Mutex::new(std::mem::take(&mut self.store));
        let options = self.options;
        let resolver = self.resolver;
        let transpiler = self.transpiler;
        let cleanup = self.cleanup;
        let cancel = self.cancel.clone();
        let (bundle_result, transpile_result) = rayon::join(
            || bundle_declarations(options, resolver, &cancel, cleanup, &store),
            || run_transpiler(options, transpiler),
        );
        self.store = store.into_inner().unwrap_or_default();

        // Both tasks have settled; the declaration error takes precedence.
        let bundles = bundle_result.map_err(BuildError::into_bundle)?;
        transpile_result?;

        self.cleanup.run();
        Ok(BuildSummary {
            no_op: false,
            bundles,
        })
    }

}

/// Bundle every resolved entry point; entries are independent graphs with
/// disjoint outputs, so they run in parallel.
fn bundle_declarations(
    options: &BuildOptions,
    resolver: &dyn Resolver,
    cancel: &CancelToken,
    cleanup: &CleanupRegistry,
    store: &Mutex<DeclarationStore>,
) -> Result<Vec<BundleOutput>, BuildError> {
    if !options.declaration {
        return Ok(Vec::new());
    }
    let entries: Vec<(String, PathBuf)> = DeclarationStore::resolve_entry_points(
        &options.entry_points,
        options.selected_entry_points.as_deref(),
    )
    .into_iter()
    .collect();

    entries
        .par_iter()
        .map(|(name, source)| {
            if cancel.is_cancelled() {
                return Err(BuildError::Internal("build cancelled".into()));
            }
            let span = info_span!("bundle", entry = %name);
            let _guard = span.enter();

            let graph_options = GraphOptions {
                external: &options.external,
                no_external: &options.no_external,
                resolve: options.resolve,
                project_dir: &options.project_dir,
                compiler_options: &options.compiler_options,
            };
            let graph = build_module_graph(store, source, &graph_options, resolver)?;
            let bundled = compose_bundle(&graph, &options.external);

            let path = options.out_dir.join(format!("{name}.d.ts"));
            write_atomic(&path, bundled.code.as_bytes(), Some(cleanup))
                .map_err(|err| BuildError::io(&path, err))?;
            info!(
                "bundled entry {name}: {} modules, {} bytes",
                graph.len(),
                bundled.code.len()
            );
            Ok(BundleOutput {
                name: name.clone(),
                path,
                exports: bundled.exports,
                size: bundled.code.len() as u64,
            })
        })
        .collect()
}

fn run_transpiler(
    options: &BuildOptions,
    transpiler: Option<&dyn Transpiler>,
) -> Result<(), BuildError> {
    if options.no_emit {
        return Ok(());
    }
    let Some(transpiler) = transpiler else {
        return Ok(());
    };
    let span = info_span!("transpile");
    let _guard = span.enter();

    let request = TranspileRequest {
        entry_points: options
            .entry_points
            .iter()
            .map(|(name, path)| (name.clone(), path.clone()))
            .collect(),
        options: options.transpile.clone(),
    };
    let result = transpiler.transpile(&request)?;
    for warning in &result.warnings {
        warn!("transpile: {warning}");
    }
    if !result.errors.is_empty() {
        return Err(BuildError::Internal(format!(
            "transpile failed: {}",
            result.errors.join("; ")
        )));
    }
    Ok(())
}
