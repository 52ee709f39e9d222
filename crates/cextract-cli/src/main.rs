//! cextract CLI
//!
//! Extracts functions of a C file together with everything they need to
//! compile on their own.

mod argv;

use anyhow::{Context, Result};
use cextract_analysis::Extractor;
use cextract_core::config::ExtractConfig;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cextract")]
#[command(
    author,
    version,
    about = "Extract self-contained C code for live patches",
    long_about = None
)]
struct Cli {
    /// C source file
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Functions to extract (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    functions: Vec<String>,

    /// Symbols to reach through `klp_` pointers even with external linkage
    #[arg(long, value_delimiter = ',')]
    export_symbols: Vec<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Copy static callees instead of externalizing them
    #[arg(long)]
    no_externalization: bool,

    /// Write the closure report as JSON
    #[arg(long)]
    dump_passes: bool,

    /// Keep `#include` lines of local headers
    #[arg(long)]
    keep_includes: bool,

    /// Header search directory (repeatable)
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    include: Vec<PathBuf>,

    /// YAML configuration file; command-line options override it
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let normalized = argv::normalize(std::env::args());
    for flag in &normalized.ignored {
        warn!("ignoring unsupported option {}", flag);
    }
    let cli = Cli::parse_from(normalized.args);
    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let config = build_config(cli)?;
    let extractor = Extractor::from_file(&cli.file, &config)
        .with_context(|| format!("failed to parse {}", cli.file.display()))?;
    let extraction = extractor.extract(&config.extract.functions)?;

    match &config.extract.output {
        Some(path) => {
            std::fs::write(path, &extraction.text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Output written to {}", path.display());
        }
        None => print!("{}", extraction.text),
    }

    if config.extract.dump_passes {
        let json = extractor.report(&extraction).to_json()?;
        match &config.extract.output {
            Some(path) => {
                let dump = dump_path(path);
                std::fs::write(&dump, json)
                    .with_context(|| format!("failed to write {}", dump.display()))?;
                info!("Closure report written to {}", dump.display());
            }
            None => eprintln!("{}", json),
        }
    }
    Ok(())
}

/// Configuration file first, then command-line overrides
fn build_config(cli: &Cli) -> Result<ExtractConfig> {
    let mut config = match &cli.config {
        Some(path) => ExtractConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ExtractConfig::default(),
    };

    let extract = &mut config.extract;
    if !cli.functions.is_empty() {
        extract.functions = cli.functions.clone();
    }
    if !cli.export_symbols.is_empty() {
        extract.export_symbols = cli.export_symbols.clone();
    }
    if cli.output.is_some() {
        extract.output = cli.output.clone();
    }
    if cli.no_externalization {
        extract.externalize = false;
    }
    if cli.dump_passes {
        extract.dump_passes = true;
    }
    if cli.keep_includes {
        config.frontend.keep_includes = true;
    }
    config
        .frontend
        .include_paths
        .extend(cli.include.iter().cloned());

    Ok(config.validate()?)
}

fn dump_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".closure.json");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        let normalized = argv::normalize(
            std::iter::once("cextract")
                .chain(args.iter().copied())
                .map(String::from),
        );
        Cli::try_parse_from(normalized.args).unwrap()
    }

    #[test]
    fn flags_override_defaults() {
        let cli = parse(&["main.c", "-f", "f, g", "--no-externalization", "-Iinc"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.extract.functions, vec!["f", "g"]);
        assert!(!config.extract.externalize);
        assert_eq!(config.frontend.include_paths, vec![PathBuf::from("inc")]);
    }

    #[test]
    fn legacy_flags_reach_the_config() {
        let cli = parse(&["-DCE_EXTRACT_FUNCTIONS=f", "-DCE_DUMP_PASSES", "-O2", "main.c"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.extract.functions, vec!["f"]);
        assert!(config.extract.dump_passes);
    }

    #[test]
    fn config_file_is_layered_under_flags() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cextract.yaml");
        fs::write(
            &path,
            concat!(
                "extract:\n",
                "  functions: [from_file]\n",
                "  export_symbols: [v]\n",
                "frontend:\n",
                "  keep_includes: true\n",
            ),
        )
        .unwrap();
        let cli = parse(&["main.c", "--config", path.to_str().unwrap(), "-f", "f"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.extract.functions, vec!["f"]);
        assert_eq!(config.extract.export_symbols, vec!["v"]);
        assert!(config.frontend.keep_includes);
    }

    #[test]
    fn missing_functions_are_rejected() {
        let cli = parse(&["main.c"]);
        assert!(build_config(&cli).is_err());
    }

    #[test]
    fn dump_sits_next_to_output() {
        assert_eq!(
            dump_path(Path::new("out/patch.c")),
            PathBuf::from("out/patch.c.closure.json")
        );
    }
}
