//! Inspect command implementation

use std::fs;
use std::path::Path;

use bunkatsu_manifest::{BuildManifest, validate_manifest};
use miette::{IntoDiagnostic, Result};

use crate::cli::OutputFormat;
use crate::output::{output_manifest, output_module};

pub fn run_inspect(path: &Path, module: Option<&str>, format: OutputFormat) -> Result<()> {
    let manifest = read_manifest(path)?;

    match module {
        Some(module) => {
            let record = manifest
                .module(module)
                .ok_or_else(|| miette::miette!("Module '{}' is not in the manifest", module))?;
            let chunk = manifest
                .chunk(&record.chunk_id)
                .ok_or_else(|| miette::miette!("Chunk '{}' is not in the manifest", record.chunk_id))?;
            output_module(record, chunk, format)
        }
        None => output_manifest(&manifest, format),
    }
}

pub fn read_manifest(path: &Path) -> Result<BuildManifest> {
    let content = fs::read_to_string(path)
        .map_err(|e| miette::miette!("Failed to read {}: {}", path.display(), e))?;
    validate_manifest(&content).into_diagnostic()
}
