//! Build manifest for bunkatsu.
//!
//! The manifest is the single artifact a build hands to the outside world:
//! every module's deterministic id and owning chunk, every chunk's output
//! path and content fingerprint, and the ordered chunk list each entrypoint
//! needs. It matches `schemas/v1/manifest.json`.

pub mod integrity;

pub use integrity::{Fingerprint, IntegrityError};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Error type for manifest operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to parse manifest JSON: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Manifest validation failed: {0}")]
    ValidationError(String),
    #[error("Inconsistent manifest: {0}")]
    Inconsistent(String),
}

/// What produced a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// Bootstrap code that maps module ids to chunks.
    Runtime,
    /// An entry's own chunk.
    Entry,
    /// A chunk produced by an explicit cache group.
    Group,
    /// The shared-module fallback group.
    Common,
}

impl ChunkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkKind::Runtime => "runtime",
            ChunkKind::Entry => "entry",
            ChunkKind::Group => "group",
            ChunkKind::Common => "common",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRecord {
    /// Deterministic module id.
    pub id: String,
    /// Root-relative source path.
    pub path: String,
    pub chunk_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub id: String,
    pub name: String,
    pub kind: ChunkKind,
    /// Cache group that produced the chunk, when it differs from `name`
    /// (split parts of an oversized group).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub output_path: String,
    pub fingerprint: Fingerprint,
    pub size_bytes: u64,
}

/// The structure of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildManifest {
    pub version: u32,
    pub modules: Vec<ModuleRecord>,
    pub chunks: Vec<ChunkRecord>,
    /// Entry name to the chunk ids it loads, runtime first and the entry's
    /// own chunk last.
    #[serde(default)]
    pub entrypoints: BTreeMap<String, Vec<String>>,
}

impl Default for BuildManifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            modules: Vec::new(),
            chunks: Vec::new(),
            entrypoints: BTreeMap::new(),
        }
    }
}

impl BuildManifest {
    /// Finds a chunk by id.
    pub fn chunk(&self, id: &str) -> Option<&ChunkRecord> {
        self.chunks.iter().find(|c| c.id == id)
    }

    /// Finds a chunk by name.
    pub fn chunk_named(&self, name: &str) -> Option<&ChunkRecord> {
        self.chunks.iter().find(|c| c.name == name)
    }

    /// Finds a module by id or by source path.
    pub fn module(&self, id_or_path: &str) -> Option<&ModuleRecord> {
        self.modules
            .iter()
            .find(|m| m.id == id_or_path || m.path == id_or_path)
    }

    /// Returns the chunk that owns a module, looked up by id or path.
    pub fn chunk_for_module(&self, id_or_path: &str) -> Option<&ChunkRecord> {
        self.module(id_or_path)
            .and_then(|m| self.chunk(&m.chunk_id))
    }

    /// Returns the modules assigned to a chunk, in manifest order.
    pub fn modules_in(&self, chunk_id: &str) -> impl Iterator<Item = &ModuleRecord> {
        self.modules.iter().filter(move |m| m.chunk_id == chunk_id)
    }

    /// Sum of all chunk sizes.
    pub fn total_size(&self) -> u64 {
        self.chunks.iter().map(|c| c.size_bytes).sum()
    }

    /// Checks the cross-references a schema cannot express.
    ///
    /// Chunk and module ids must be unique, every module must point at an
    /// existing chunk, and every entrypoint must list existing chunks.
    pub fn check_consistency(&self) -> Result<(), ManifestError> {
        let mut chunk_ids = HashSet::new();
        for chunk in &self.chunks {
            if !chunk_ids.insert(chunk.id.as_str()) {
                return Err(ManifestError::Inconsistent(format!(
                    "duplicate chunk id '{}'",
                    chunk.id
                )));
            }
        }

        let mut module_ids: HashMap<&str, &str> = HashMap::new();
        for module in &self.modules {
            if let Some(previous) = module_ids.insert(module.id.as_str(), module.path.as_str()) {
                return Err(ManifestError::Inconsistent(format!(
                    "module id '{}' is shared by '{}' and '{}'",
                    module.id, previous, module.path
                )));
            }
            if !chunk_ids.contains(module.chunk_id.as_str()) {
                return Err(ManifestError::Inconsistent(format!(
                    "module '{}' refers to unknown chunk '{}'",
                    module.path, module.chunk_id
                )));
            }
        }

        for (entry, chunks) in &self.entrypoints {
            if let Some(missing) = chunks.iter().find(|id| !chunk_ids.contains(id.as_str())) {
                return Err(ManifestError::Inconsistent(format!(
                    "entrypoint '{entry}' refers to unknown chunk '{missing}'"
                )));
            }
        }

        Ok(())
    }

    /// Serializes the manifest as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, ManifestError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// Path is relative to this file: ../../../schemas/v1/manifest.json
const MANIFEST_SCHEMA_JSON: &str = include_str!("../../../schemas/v1/manifest.json");

static SCHEMA: OnceLock<Validator> = OnceLock::new();

/// Parses and validates a manifest JSON string.
pub fn validate_manifest(json_str: &str) -> Result<BuildManifest, ManifestError> {
    let instance: Value = serde_json::from_str(json_str)?;

    let schema = SCHEMA.get_or_init(|| {
        let schema_json: Value =
            serde_json::from_str(MANIFEST_SCHEMA_JSON).expect("Invalid embedded schema");
        Validator::new(&schema_json).expect("Invalid schema compilation")
    });

    if let Err(e) = schema.validate(&instance) {
        let error_msg = format!("{} at {}", e, e.instance_path());
        return Err(ManifestError::ValidationError(error_msg));
    }

    let manifest: BuildManifest = serde_json::from_value(instance)?;
    manifest.check_consistency()?;
    Ok(manifest)
}
