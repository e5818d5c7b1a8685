//! bunkatsu CLI
//!
//! Splits a module graph into deterministic, long-term cacheable chunks.

mod cli;
mod commands;
mod output;
mod utils;

use std::process::ExitCode;

use clap::Parser;
use miette::Result;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(has_warnings) => {
            if has_warnings {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("{:?}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> Result<bool> {
    match &cli.command {
        Commands::Init { force } => commands::init::run_init(*force).map(|_| false),
        Commands::Build {
            root,
            out_dir,
            dry_run,
            strict,
            format,
        } => commands::build::run_build(
            cli,
            root.as_deref(),
            out_dir.as_deref(),
            *dry_run,
            *strict,
            *format,
        ),
        Commands::Inspect {
            manifest,
            module,
            format,
        } => commands::inspect::run_inspect(manifest, module.as_deref(), *format).map(|_| false),
        Commands::Precache {
            manifest,
            verify,
            format,
        } => commands::precache::run_precache(cli, manifest, verify.as_deref(), *format)
            .map(|_| false),
    }
}
