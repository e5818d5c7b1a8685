//! Output formatting module

mod json;
mod text;

use bunkatsu_core::BuildOutput;
use bunkatsu_manifest::{BuildManifest, ChunkRecord, ModuleRecord};
use bunkatsu_runtime::PrecacheManifest;
use miette::Result;

use crate::cli::OutputFormat;

pub fn output_build(output: &BuildOutput, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => json::output_build(output),
        OutputFormat::Text => {
            text::output_build(output);
            Ok(())
        }
    }
}

pub fn output_manifest(manifest: &BuildManifest, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => json::output_manifest(manifest),
        OutputFormat::Text => {
            text::output_manifest(manifest);
            Ok(())
        }
    }
}

pub fn output_module(module: &ModuleRecord, chunk: &ChunkRecord, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => json::output_module(module, chunk),
        OutputFormat::Text => {
            println!(
                "{} ({}) -> {} ({}) {}",
                module.path, module.id, chunk.name, chunk.id, chunk.output_path
            );
            Ok(())
        }
    }
}

pub fn output_precache(list: &PrecacheManifest, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => json::output_precache(list),
        OutputFormat::Text => {
            for entry in list.iter() {
                println!("{}  {}", entry.revision, entry.url);
            }
            Ok(())
        }
    }
}
