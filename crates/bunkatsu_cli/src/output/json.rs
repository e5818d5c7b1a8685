//! JSON output formatter

use bunkatsu_core::BuildOutput;
use bunkatsu_manifest::{BuildManifest, ChunkRecord, ModuleRecord};
use bunkatsu_runtime::PrecacheManifest;
use miette::{IntoDiagnostic, Result};

fn print(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

pub fn output_build(output: &BuildOutput) -> Result<()> {
    print(&serde_json::json!({
        "manifest": output.manifest,
        "warnings": output.warnings,
    }))
}

pub fn output_manifest(manifest: &BuildManifest) -> Result<()> {
    let chunks: Vec<_> = manifest
        .chunks
        .iter()
        .map(|chunk| {
            serde_json::json!({
                "id": chunk.id,
                "name": chunk.name,
                "kind": chunk.kind,
                "outputPath": chunk.output_path,
                "sizeBytes": chunk.size_bytes,
                "modules": manifest.modules_in(&chunk.id).count(),
            })
        })
        .collect();
    print(&serde_json::json!({
        "chunks": chunks,
        "entrypoints": manifest.entrypoints,
        "totalSize": manifest.total_size(),
    }))
}

pub fn output_module(module: &ModuleRecord, chunk: &ChunkRecord) -> Result<()> {
    print(&serde_json::json!({
        "module": module,
        "chunk": chunk,
    }))
}

pub fn output_precache(list: &PrecacheManifest) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(list).into_diagnostic()?);
    Ok(())
}
