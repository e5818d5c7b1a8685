//! The build pipeline: graph, cache groups, chunks, ids, assets, manifest.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use bunkatsu_cache::BuildCache;
use bunkatsu_graph::{GraphBuilder, ModuleGraph, Resolver};
use bunkatsu_manifest::{
    BuildManifest, ChunkKind, ChunkRecord, MANIFEST_VERSION, ModuleRecord,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{Config, Hints};
use crate::emit::{Asset, Emitter};
use crate::fs_resolver::FsResolver;
use crate::ids::IdAssigner;
use crate::matcher::CacheGroupMatcher;
use crate::selector::{ChunkSelector, Partition};
use crate::BundleError;

/// File name of the manifest written next to the assets.
pub const MANIFEST_FILE: &str = "manifest.json";

/// A non-fatal condition recorded during a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildWarning {
    /// A module larger than its group's `max_size` was emitted alone.
    SizeOverflow {
        group: String,
        module: String,
        size: u64,
        max_size: u64,
    },
    /// A chunk exceeds `performance.max_asset_size`.
    AssetTooLarge { chunk: String, size: u64, limit: u64 },
    /// The chunks an entry loads exceed `performance.max_entrypoint_size`.
    EntrypointTooLarge { entry: String, size: u64, limit: u64 },
    /// The build cache could not be read or written.
    CacheUnavailable { reason: String },
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeOverflow {
                group,
                module,
                size,
                max_size,
            } => write!(
                f,
                "{module} ({size} bytes) exceeds max_size {max_size} of cache group '{group}' and was placed in its own chunk"
            ),
            Self::AssetTooLarge { chunk, size, limit } => {
                write!(f, "chunk '{chunk}' is {size} bytes (limit {limit})")
            }
            Self::EntrypointTooLarge { entry, size, limit } => {
                write!(f, "entrypoint '{entry}' loads {size} bytes (limit {limit})")
            }
            Self::CacheUnavailable { reason } => write!(f, "build cache unavailable: {reason}"),
        }
    }
}

/// Everything a build produces.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub manifest: BuildManifest,
    /// Rendered chunks in manifest order.
    pub assets: Vec<Asset>,
    pub warnings: Vec<BuildWarning>,
}

/// Runs builds for one configuration.
#[derive(Debug, Clone)]
pub struct Bundler {
    config: Config,
    root: PathBuf,
    use_cache: bool,
}

impl Bundler {
    /// Creates a bundler rooted at the configuration's directory.
    pub fn new(config: Config) -> Self {
        let root = config
            .base_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            use_cache: config.cache,
            config,
            root,
        }
    }

    /// Overrides the project root.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Enables or disables the build cache regardless of configuration.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The configured output directory under the root.
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.config.output.dir)
    }

    /// Builds the project from the filesystem.
    ///
    /// A corrupt or unwritable build cache is reported as a warning and
    /// never fails the build.
    pub fn build(&self) -> Result<BuildOutput, BundleError> {
        let mut warnings = Vec::new();

        let mut cache = BuildCache::new(self.root.join(&self.config.cache_dir));
        if !self.use_cache {
            cache.disable();
        }
        if let Err(e) = cache.load() {
            warn!("Ignoring build cache: {}", e);
            warnings.push(BuildWarning::CacheUnavailable {
                reason: e.to_string(),
            });
            cache.clear();
        }

        let resolver =
            FsResolver::new(&self.root, self.config.resolve.clone()).with_cache(cache, self.config.hash());
        let (graph, mut output) = self.run(&resolver)?;

        if let Err(e) = resolver.save_cache(graph.modules().iter().map(|m| &m.id)) {
            warn!("Failed to save build cache: {}", e);
            output.warnings.push(BuildWarning::CacheUnavailable {
                reason: e.to_string(),
            });
        }

        warnings.append(&mut output.warnings);
        output.warnings = warnings;
        Ok(output)
    }

    /// Builds the project through a custom resolver.
    pub fn build_with<R: Resolver + ?Sized>(&self, resolver: &R) -> Result<BuildOutput, BundleError> {
        self.run(resolver).map(|(_, output)| output)
    }

    fn run<R: Resolver + ?Sized>(&self, resolver: &R) -> Result<(ModuleGraph, BuildOutput), BundleError> {
        if self.config.entries.is_empty() {
            return Err(BundleError::config("No entries configured"));
        }

        let graph = GraphBuilder::new(resolver).build(self.config.entries.as_slice())?;
        let output = self.chunk(&graph)?;
        Ok((graph, output))
    }

    /// Partitions an already built graph and renders its assets.
    pub fn chunk(&self, graph: &ModuleGraph) -> Result<BuildOutput, BundleError> {
        let matcher = CacheGroupMatcher::new(&self.config.cache_groups)?;
        let emitter = Emitter::new(&self.config.output)?;

        let matches = matcher.match_graph(graph);
        let partition = ChunkSelector::new(matcher.groups(), self.config.runtime_chunk.clone())
            .select(graph, &matches)?;

        let assigner = IdAssigner::default();
        let module_ids = assigner.assign(graph.modules().iter().map(|m| m.id.as_str()));
        let chunk_ids = assigner.assign(partition.chunks.iter().map(|c| c.name.as_str()));

        let assets = emitter.emit(graph, &partition, &module_ids, &chunk_ids)?;
        let manifest = build_manifest(graph, &partition, &assets, &module_ids, &chunk_ids);
        manifest.check_consistency()?;

        let mut warnings: Vec<BuildWarning> = partition
            .overflows
            .iter()
            .map(|o| BuildWarning::SizeOverflow {
                group: o.group.clone(),
                module: o.module.to_string(),
                size: o.size,
                max_size: o.max_size,
            })
            .collect();
        warnings.extend(self.check_performance(&manifest)?);

        info!(
            "Built {} chunks ({} bytes) for {} modules",
            manifest.chunks.len(),
            manifest.total_size(),
            manifest.modules.len()
        );

        Ok(BuildOutput {
            manifest,
            assets,
            warnings,
        })
    }

    fn check_performance(&self, manifest: &BuildManifest) -> Result<Vec<BuildWarning>, BundleError> {
        let performance = &self.config.performance;
        if performance.hints == Hints::Off {
            return Ok(Vec::new());
        }

        let mut warnings = Vec::new();
        for chunk in &manifest.chunks {
            if chunk.size_bytes > performance.max_asset_size {
                warnings.push(BuildWarning::AssetTooLarge {
                    chunk: chunk.name.clone(),
                    size: chunk.size_bytes,
                    limit: performance.max_asset_size,
                });
            }
        }
        for (entry, chunk_ids) in &manifest.entrypoints {
            let size: u64 = chunk_ids
                .iter()
                .filter_map(|id| manifest.chunk(id))
                .map(|c| c.size_bytes)
                .sum();
            if size > performance.max_entrypoint_size {
                warnings.push(BuildWarning::EntrypointTooLarge {
                    entry: entry.clone(),
                    size,
                    limit: performance.max_entrypoint_size,
                });
            }
        }

        if performance.hints == Hints::Error {
            match warnings.first() {
                Some(BuildWarning::AssetTooLarge { chunk, size, limit }) => {
                    return Err(BundleError::AssetTooLarge {
                        name: chunk.clone(),
                        size: *size,
                        limit: *limit,
                    });
                }
                Some(BuildWarning::EntrypointTooLarge { entry, size, limit }) => {
                    return Err(BundleError::AssetTooLarge {
                        name: entry.clone(),
                        size: *size,
                        limit: *limit,
                    });
                }
                _ => {}
            }
        }

        for warning in &warnings {
            warn!("Performance: {}", warning);
        }
        Ok(warnings)
    }

    /// Writes every asset and `manifest.json` into `out_dir` (or the
    /// configured output directory) and returns the written paths.
    pub fn write_assets(
        &self,
        output: &BuildOutput,
        out_dir: Option<&Path>,
    ) -> Result<Vec<PathBuf>, BundleError> {
        let out_dir = out_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.output_dir());
        fs::create_dir_all(&out_dir)?;

        let mut written = Vec::with_capacity(output.assets.len() + 1);
        for asset in &output.assets {
            let relative = Path::new(&asset.output_path);
            if !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
            {
                return Err(BundleError::config(format!(
                    "Output path '{}' must stay inside the output directory",
                    asset.output_path
                )));
            }
            let path = out_dir.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &asset.contents)?;
            written.push(path);
        }

        let manifest_path = out_dir.join(MANIFEST_FILE);
        fs::write(&manifest_path, output.manifest.to_json_pretty()?)?;
        written.push(manifest_path);

        info!("Wrote {} files to {}", written.len(), out_dir.display());
        Ok(written)
    }
}

fn build_manifest(
    graph: &ModuleGraph,
    partition: &Partition,
    assets: &[Asset],
    module_ids: &[String],
    chunk_ids: &[String],
) -> BuildManifest {
    let modules = graph
        .modules()
        .iter()
        .enumerate()
        .map(|(position, module)| ModuleRecord {
            id: module_ids[position].clone(),
            path: module.id.to_string(),
            chunk_id: chunk_ids[partition.owner[position]].clone(),
        })
        .collect();

    let chunks = assets
        .iter()
        .map(|asset| {
            let planned = &partition.chunks[asset.chunk];
            ChunkRecord {
                id: asset.chunk_id.clone(),
                name: asset.name.clone(),
                kind: asset.kind,
                group: planned.group.clone().filter(|g| *g != planned.name),
                output_path: asset.output_path.clone(),
                fingerprint: asset.fingerprint.clone(),
                size_bytes: asset.contents.len() as u64,
            }
        })
        .collect();

    let runtime = partition
        .chunks
        .iter()
        .position(|c| c.kind == ChunkKind::Runtime);

    let mut entrypoints = BTreeMap::new();
    for (entry_index, entry) in graph.entries().iter().enumerate() {
        let own = partition
            .chunks
            .iter()
            .position(|c| c.entry == Some(entry_index));
        let needed: BTreeSet<usize> = graph
            .reachable_from(&entry.roots)
            .into_iter()
            .map(|position| partition.owner[position])
            .collect();

        let mut ids: Vec<String> = Vec::new();
        ids.extend(runtime.map(|r| chunk_ids[r].clone()));
        ids.extend(
            needed
                .iter()
                .filter(|&&chunk| Some(chunk) != own)
                .map(|&chunk| chunk_ids[chunk].clone()),
        );
        ids.extend(own.map(|o| chunk_ids[o].clone()));
        entrypoints.insert(entry.name.clone(), ids);
    }

    BuildManifest {
        version: MANIFEST_VERSION,
        modules,
        chunks,
        entrypoints,
    }
}
