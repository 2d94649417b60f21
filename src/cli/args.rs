use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for the tsbundle binary.
#[derive(Parser, Debug)]
#[command(
    name = "tsbundle",
    version,
    about = "TypeScript build driver with declaration bundling"
)]
pub struct CliArgs {
    /// Rebuild from scratch, ignoring the declaration cache.
    #[arg(short, long)]
    pub force: bool,

    /// Watch input files and rebuild on changes.
    #[arg(short, long)]
    pub watch: bool,

    /// Path to the project directory or its tsbundle.json.
    #[arg(short = 'p', long = "project")]
    pub project: Option<PathBuf>,

    /// Skip transpiled JavaScript output.
    #[arg(short = 'n', long = "noEmit", alias = "no-emit")]
    pub no_emit: bool,

    /// Delete the declaration cache before building.
    #[arg(short = 'c', long = "clearCache", alias = "clear-cache")]
    pub clear_cache: bool,

    /// Minify transpiled output.
    #[arg(short, long)]
    pub minify: bool,

    /// Entry point names to bundle (default: index, or every entry when no
    /// index is configured).
    #[arg(value_name = "ENTRY")]
    pub entries: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_flags() {
        let args = CliArgs::parse_from(["tsbundle", "-f", "-n", "-c", "-m"]);
        assert!(args.force);
        assert!(args.no_emit);
        assert!(args.clear_cache);
        assert!(args.minify);
        assert!(!args.watch);
    }

    #[test]
    fn parses_camel_case_long_flags() {
        let args = CliArgs::parse_from(["tsbundle", "--noEmit", "--clearCache"]);
        assert!(args.no_emit);
        assert!(args.clear_cache);
    }

    #[test]
    fn positional_entries_select_bundles() {
        let args = CliArgs::parse_from(["tsbundle", "index", "cli"]);
        assert_eq!(args.entries, vec!["index".to_string(), "cli".to_string()]);
    }
}
