//! Precache lists derived from a build manifest.

use bunkatsu_core::PrecacheConfig;
use bunkatsu_manifest::BuildManifest;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RuntimeError;

/// One asset to install ahead of time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecacheEntry {
    pub url: String,
    /// The asset's fingerprint; the fetched body must hash to it.
    pub revision: String,
}

/// The assets installed by [`RuntimeCache::install`](crate::RuntimeCache::install).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecacheManifest {
    pub entries: Vec<PrecacheEntry>,
}

impl PrecacheManifest {
    /// Lists every chunk that passes the size limit and the include/exclude
    /// globs, in manifest order.
    pub fn from_build_manifest(
        manifest: &BuildManifest,
        config: &PrecacheConfig,
    ) -> Result<Self, RuntimeError> {
        let include = build_globset(&config.include)?;
        let exclude = build_globset(&config.exclude)?;

        let entries = manifest
            .chunks
            .iter()
            .filter(|chunk| {
                if chunk.size_bytes > config.maximum_file_size_to_cache_in_bytes {
                    debug!(
                        "Not precaching {} ({} bytes over the limit)",
                        chunk.output_path,
                        chunk.size_bytes - config.maximum_file_size_to_cache_in_bytes
                    );
                    return false;
                }
                let included = include
                    .as_ref()
                    .is_none_or(|set| set.is_match(&chunk.output_path));
                let excluded = exclude
                    .as_ref()
                    .is_some_and(|set| set.is_match(&chunk.output_path));
                included && !excluded
            })
            .map(|chunk| PrecacheEntry {
                url: join_url(&config.base_url, &chunk.output_path),
                revision: chunk.fingerprint.to_string(),
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrecacheEntry> {
        self.entries.iter()
    }
}

/// Returns `None` for an empty pattern list.
fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>, RuntimeError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(Some(builder.build()?))
}

fn join_url(base: &str, path: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
