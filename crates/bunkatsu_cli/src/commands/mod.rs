//! Command implementations

pub mod build;
pub mod init;
pub mod inspect;
pub mod precache;

use std::path::Path;

use bunkatsu_core::Config;
use miette::{IntoDiagnostic, Result};
use tracing::info;

use crate::cli::Cli;

/// Loads `--config`, or the configuration discovered in `dir`, or defaults.
pub fn load_config(cli: &Cli, dir: &Path) -> Result<Config> {
    if let Some(ref path) = cli.config {
        return Config::from_file(path).into_diagnostic();
    }

    if let Some(path) = Config::discover(dir) {
        info!("Using config: {}", path.display());
        return Config::from_file(&path).into_diagnostic();
    }

    info!("No config file found, using defaults");
    Ok(Config::new())
}
