use clap::Parser;
use std::ffi::OsString;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{info, warn};

use tsbundle::cache::DeclarationCache;
use tsbundle::cleanup::CleanupRegistry;
use tsbundle::cli::args::CliArgs;
use tsbundle::compiler::DeclarationDirCompiler;
use tsbundle::config::load_config;
use tsbundle::driver::Builder;
use tsbundle::error::{BuildError, EXIT_SUCCESS, EXIT_UNCAUGHT};
use tsbundle::resolver::NodeResolver;

fn main() {
    // RUST_LOG=debug for detailed tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let preprocessed = preprocess_args(std::env::args_os().collect());
    let args = CliArgs::parse_from(preprocessed);

    let code = match std::panic::catch_unwind(AssertUnwindSafe(|| run(&args))) {
        Ok(code) => code,
        Err(_) => EXIT_UNCAUGHT,
    };
    std::process::exit(code);
}

/// `-v` means version here (tsc convention); clap reserves `-V`.
fn preprocess_args(args: Vec<OsString>) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| if arg == "-v" { OsString::from("-V") } else { arg })
        .collect()
}

fn run(args: &CliArgs) -> i32 {
    match try_run(args) {
        Ok(()) => EXIT_SUCCESS,
        Err(err) => {
            eprintln!("tsbundle: {err}");
            err.exit_code()
        }
    }
}

fn try_run(args: &CliArgs) -> Result<(), BuildError> {
    let cwd = std::env::current_dir()
        .map_err(|err| BuildError::Configuration(format!("cannot resolve working directory: {err}")))?;
    let project = match &args.project {
        Some(path) if path.is_absolute() => path.clone(),
        Some(path) => cwd.join(path),
        None => cwd,
    };
    let (project_dir, config) = load_config(&project)?;
    let mut options = config.into_build_options(&project_dir)?;
    if args.minify {
        options.transpile.minify = true;
    }
    if args.no_emit {
        options.no_emit = true;
    }
    if !args.entries.is_empty() {
        options.selected_entry_points = Some(args.entries.clone());
    }

    if args.clear_cache || args.force {
        DeclarationCache::new(&options.project_dir, options.out_dir.join(".tsbuildinfo"))
            .invalidate();
        info!("declaration cache cleared");
    }
    if args.watch {
        warn!("watch mode needs the external file watcher; running a single build");
    }

    let started = Instant::now();
    let mut compiler = DeclarationDirCompiler::new(options.declaration_dir.clone());
    let cleanup = CleanupRegistry::new();
    let mut builder = Builder::new(&options, &mut compiler, None, &NodeResolver, &cleanup);
    let result = builder.build();
    cleanup.run();
    let summary = result?;

    if summary.no_op {
        println!("tsbundle: up to date ({} ms)", started.elapsed().as_millis());
        return Ok(());
    }
    for bundle in &summary.bundles {
        let shown = bundle
            .path
            .strip_prefix(&options.project_dir)
            .unwrap_or(&bundle.path);
        println!("  {} ({} bytes)", shown.display(), bundle.size);
    }
    println!(
        "tsbundle: built {} bundle{} in {} ms",
        summary.bundles.len(),
        if summary.bundles.len() == 1 { "" } else { "s" },
        started.elapsed().as_millis()
    );
    Ok(())
}
