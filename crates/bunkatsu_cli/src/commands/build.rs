//! Build command implementation

use std::path::Path;

use bunkatsu_core::Bundler;
use miette::{IntoDiagnostic, Result};
use tracing::info;

use crate::cli::{Cli, OutputFormat};
use crate::output::output_build;

/// Returns true when `strict` is set and the build produced warnings.
pub fn run_build(
    cli: &Cli,
    root: Option<&Path>,
    out_dir: Option<&Path>,
    dry_run: bool,
    strict: bool,
    format: OutputFormat,
) -> Result<bool> {
    let config = super::load_config(cli, root.unwrap_or(Path::new(".")))?;

    let mut bundler = Bundler::new(config);
    if let Some(root) = root {
        bundler = bundler.with_root(root);
    }
    if cli.no_cache {
        bundler = bundler.with_cache(false);
    }

    let output = bundler.build().into_diagnostic()?;

    if dry_run {
        info!("Dry run: nothing written");
    } else {
        bundler.write_assets(&output, out_dir).into_diagnostic()?;
    }

    output_build(&output, format)?;

    Ok(strict && !output.warnings.is_empty())
}
