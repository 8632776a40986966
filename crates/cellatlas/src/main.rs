//! cellatlas: compile cross-session cell registration output into a
//! session-ordered registry.

use anyhow::Context;
use cellatlas_core::logging::{LogConfig, LogFormat, init_logging};
use cellatlas_core::RegistryCompiler;
use cellatlas_core::registry;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "cellatlas",
    version,
    about = "Cross-session cell registration compiler"
)]
struct Cli {
    /// Log level filter (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "CELLATLAS_LOG")]
    log_level: String,

    /// Log output format (pretty or json)
    #[arg(long, global = true, default_value = "pretty")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile the registration container in DIR into registry artifacts
    Compile {
        /// Directory holding exactly one cellreg*.regz container
        dir: PathBuf,
    },
    /// Summarize previously compiled registry artifacts in DIR
    Info {
        /// Directory holding compiled registry artifacts
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log = LogConfig {
        level: cli.log_level.clone(),
        format: cli.log_format,
    };
    if let Err(err) = init_logging(&log) {
        eprintln!("cellatlas: {err}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Compile { dir } => compile(&dir),
        Command::Info { dir } => info(&dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(core_err) = err.downcast_ref::<cellatlas_core::Error>() {
                tracing::error!(phase = core_err.phase(), "compilation aborted");
            }
            eprintln!("cellatlas: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn compile(dir: &Path) -> anyhow::Result<()> {
    let registry = RegistryCompiler::new(dir)
        .run()
        .with_context(|| format!("compiling registration container in {}", dir.display()))?;
    println!(
        "compiled {} global cells across {} sessions",
        registry.match_map.num_cells(),
        registry.match_map.num_sessions()
    );
    Ok(())
}

fn info(dir: &Path) -> anyhow::Result<()> {
    let match_map = registry::load_match_map(dir)
        .with_context(|| format!("loading match map from {}", dir.display()))?;
    let footprints = registry::load_footprints(dir)
        .with_context(|| format!("loading footprints from {}", dir.display()))?;
    let centroids = registry::load_centroids(dir)
        .with_context(|| format!("loading centroids from {}", dir.display()))?;

    println!(
        "registry: {} global cells, {} sessions",
        match_map.num_cells(),
        match_map.num_sessions()
    );
    if let Some(fp) = footprints.first() {
        println!("field of view: {} x {}", fp.dim().1, fp.dim().2);
    }
    for session in 0..match_map.num_sessions() {
        let matched = match_map.column_cardinality(session);
        let fp_cells = footprints.get(session).map_or(0, |fp| fp.dim().0);
        let cn_cells = centroids.get(session).map_or(0, |cn| cn.nrows());
        println!(
            "session {session}: {matched} matched, {fp_cells} footprints, {cn_cells} centroids"
        );
    }
    let total_unmatched = (0..match_map.num_sessions())
        .map(|s| match_map.num_cells() - match_map.column_cardinality(s))
        .sum::<usize>();
    println!("unmatched cell-session pairs: {total_unmatched}");
    Ok(())
}
