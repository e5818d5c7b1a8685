//! # bunkatsu_core
//!
//! Chunking engine for bunkatsu.
//!
//! This crate provides:
//! - Configuration loading (`.bunkatsu.jsonc`)
//! - The cache group matcher and chunk selector
//! - Deterministic module and chunk ids
//! - Chunk rendering, fingerprinting and the build manifest
//! - A filesystem resolver backed by the incremental build cache
//!
//! ## Example
//!
//! ```rust,ignore
//! use bunkatsu_core::{Bundler, Config};
//!
//! let config = Config::from_file(".bunkatsu.jsonc")?;
//! let bundler = Bundler::new(config);
//!
//! let output = bundler.build()?;
//! bundler.write_assets(&output, None)?;
//! for chunk in &output.manifest.chunks {
//!     println!("{} -> {}", chunk.name, chunk.output_path);
//! }
//! ```

mod bundler;
pub mod config;
pub mod emit;
mod error;
pub mod fs_resolver;
pub mod ids;
pub mod matcher;
pub mod selector;

pub use bundler::{BuildOutput, BuildWarning, Bundler, MANIFEST_FILE};
pub use config::{
    CacheGroupConfig, Config, GroupKind, Hints, PrecacheConfig, RouteConfig, Strategy,
};
pub use emit::{Asset, OutputTemplate};
pub use error::BundleError;
pub use fs_resolver::FsResolver;
pub use ids::IdAssigner;
pub use matcher::{CacheGroup, CacheGroupMatcher};
pub use selector::{ChunkSelector, Partition, PlannedChunk, SizeOverflow};

pub use bunkatsu_graph::{EntryDecl, ModuleGraph, Origin};
pub use bunkatsu_manifest::{BuildManifest, ChunkKind, ChunkRecord, Fingerprint, ModuleRecord};
