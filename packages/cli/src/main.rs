#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the topology validation checks.

mod progress;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use topocheck_checks::registry::all_check_configs;
use topocheck_checks::{CheckConfig, build_checks, load_config_dir};
use topocheck_core::{Check, CheckReport, RunOptions, run_checks};
use topocheck_gateway::partition::load_partition_file;

use crate::progress::{CheckBar, init_logger};

#[derive(Parser)]
#[command(name = "topocheck", about = "Topology validation checks for map partitions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run checks over a `GeoJSON` partition and write flags as JSON lines
    Run {
        /// Partition file (`GeoJSON` `FeatureCollection`)
        partition: PathBuf,
        /// Comma-separated list of check ids to run. Defaults to every
        /// enabled check.
        #[arg(long, value_delimiter = ',')]
        checks: Vec<String>,
        /// Directory of check TOML files replacing the built-in set
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write flags here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        /// Evaluate features one at a time on the current thread
        #[arg(long)]
        sequential: bool,
    },
    /// List the configured checks
    Checks {
        /// Directory of check TOML files replacing the built-in set
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            partition,
            checks,
            config,
            output,
            sequential,
        } => {
            let configs = configs(config.as_deref())?;
            let checks = build_checks(&configs, &checks)?;

            let start = Instant::now();
            let atlas = load_partition_file(&partition)?;
            log::info!(
                "Loaded {} feature(s) from {} in {:.1}s",
                atlas.len(),
                partition.display(),
                start.elapsed().as_secs_f64()
            );

            let progress_for = |check: &dyn Check| CheckBar::new(&multi, check);
            let reports = run_checks(&checks, &atlas, RunOptions { sequential }, &progress_for);

            let written = match output {
                Some(path) => write_flags(&reports, BufWriter::new(File::create(&path)?))?,
                None => write_flags(&reports, std::io::stdout().lock())?,
            };
            log::info!(
                "{written} flag(s) from {} check(s) in {:.1}s",
                reports.len(),
                start.elapsed().as_secs_f64()
            );
        }
        Commands::Checks { config } => {
            for config in configs(config.as_deref())? {
                let state = if config.enabled { "" } else { " (disabled)" };
                println!("{}{state}: {}", config.id, config.description);
            }
        }
    }

    Ok(())
}

/// The configured checks: the directory if given, the built-in set
/// otherwise.
fn configs(dir: Option<&Path>) -> Result<Vec<CheckConfig>, Box<dyn std::error::Error>> {
    Ok(match dir {
        Some(dir) => {
            log::info!("Loading check configuration from {}", dir.display());
            load_config_dir(dir)?
        }
        None => all_check_configs(),
    })
}

fn write_flags(reports: &[CheckReport], mut out: impl Write) -> std::io::Result<usize> {
    let mut written = 0;
    for report in reports {
        if report.failed > 0 {
            log::warn!(
                "{}: {} of {} item(s) failed",
                report.check,
                report.failed,
                report.evaluated
            );
        }
        for flag in &report.flags {
            serde_json::to_writer(&mut out, flag)?;
            writeln!(out)?;
            written += 1;
        }
    }
    out.flush()?;
    Ok(written)
}
