//! Text output formatter

use bunkatsu_core::BuildOutput;
use bunkatsu_manifest::BuildManifest;

fn print_chunks(manifest: &BuildManifest) {
    println!(
        "{:<16} | {:<7} | {:>7} | {:>10} | {}",
        "Chunk", "Kind", "Modules", "Size", "Output"
    );
    println!("{:-<16}-+-{:-<7}-+-{:-<7}-+-{:-<10}-+-{:-<20}", "", "", "", "", "");
    for chunk in &manifest.chunks {
        println!(
            "{:<16} | {:<7} | {:>7} | {:>10} | {}",
            chunk.name,
            chunk.kind.as_str(),
            manifest.modules_in(&chunk.id).count(),
            chunk.size_bytes,
            chunk.output_path
        );
    }
}

pub fn output_build(output: &BuildOutput) {
    print_chunks(&output.manifest);

    if !output.warnings.is_empty() {
        println!();
        for warning in &output.warnings {
            println!("warning: {}", warning);
        }
    }

    println!();
    println!(
        "Built {} chunks from {} modules ({} bytes), {} warnings",
        output.manifest.chunks.len(),
        output.manifest.modules.len(),
        output.manifest.total_size(),
        output.warnings.len()
    );
}

pub fn output_manifest(manifest: &BuildManifest) {
    print_chunks(manifest);

    if !manifest.entrypoints.is_empty() {
        println!("\nEntrypoints:");
        for (entry, chunk_ids) in &manifest.entrypoints {
            let names: Vec<&str> = chunk_ids
                .iter()
                .map(|id| manifest.chunk(id).map_or(id.as_str(), |c| c.name.as_str()))
                .collect();
            println!("  {}: {}", entry, names.join(", "));
        }
    }

    println!();
    println!(
        "{} modules in {} chunks ({} bytes)",
        manifest.modules.len(),
        manifest.chunks.len(),
        manifest.total_size()
    );
}
