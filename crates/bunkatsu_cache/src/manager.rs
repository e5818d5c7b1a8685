//! Build cache manager.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::{CacheError, ModuleCacheEntry};

const CACHE_FILE: &str = "cache.rkyv";

/// Manages the scanned-imports cache for all module files of a project.
pub struct BuildCache {
    /// Directory where cache files are stored.
    cache_dir: PathBuf,
    /// In-memory cache entries keyed by module id.
    entries: HashMap<String, ModuleCacheEntry>,
    /// Whether cache is enabled.
    enabled: bool,
}

impl BuildCache {
    /// Creates a new build cache.
    ///
    /// # Arguments
    ///
    /// * `cache_dir` - Directory to store cache files
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            entries: HashMap::new(),
            enabled: true,
        }
    }

    /// Disables caching.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Enables caching.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Returns whether caching is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Computes the BLAKE3 hash of content.
    pub fn hash_content(content: impl AsRef<[u8]>) -> String {
        blake3::hash(content.as_ref()).to_hex().to_string()
    }

    /// Gets a cached entry for a module.
    pub fn get(&self, key: &str) -> Option<&ModuleCacheEntry> {
        if !self.enabled {
            return None;
        }
        self.entries.get(key)
    }

    /// Returns the cached imports of a module if the entry is still valid.
    pub fn lookup(&self, key: &str, content_hash: &str, config_hash: &str) -> Option<&[String]> {
        self.get(key)
            .filter(|entry| entry.is_valid(content_hash, config_hash))
            .map(|entry| entry.imports.as_slice())
    }

    /// Checks if a module's cache is valid.
    pub fn is_valid(&self, key: &str, content_hash: &str, config_hash: &str) -> bool {
        self.lookup(key, content_hash, config_hash).is_some()
    }

    /// Stores a cache entry for a module.
    pub fn set(&mut self, key: impl Into<String>, entry: ModuleCacheEntry) {
        if self.enabled {
            self.entries.insert(key.into(), entry);
        }
    }

    /// Removes a cache entry.
    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Drops entries for modules that are no longer part of the build.
    pub fn retain_keys(&mut self, live: &HashSet<String>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| live.contains(key));
        let pruned = before - self.entries.len();
        if pruned > 0 {
            debug!("Pruned {} stale cache entries", pruned);
        }
        pruned
    }

    /// Clears all cache entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Loads cache from disk.
    pub fn load(&mut self) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }

        let cache_file = self.cache_dir.join(CACHE_FILE);

        if !cache_file.exists() {
            debug!("No cache file found at {}", cache_file.display());
            return Ok(());
        }

        let content = fs::read(&cache_file)?;
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(content.len());
        aligned.extend_from_slice(&content);

        let entries: HashMap<String, ModuleCacheEntry> =
            rkyv::from_bytes::<_, rkyv::rancor::Error>(&aligned)
                .map_err(|e| CacheError::Corrupted {
                    path: cache_file.clone(),
                    reason: e.to_string(),
                })?;

        info!("Loaded {} cache entries", entries.len());
        self.entries = entries;

        Ok(())
    }

    /// Saves cache to disk.
    pub fn save(&self) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }

        fs::create_dir_all(&self.cache_dir)?;

        let cache_file = self.cache_dir.join(CACHE_FILE);
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&self.entries)
            .map_err(|e| CacheError::Encode(e.to_string()))?;

        fs::write(&cache_file, bytes)?;

        info!(
            "Saved {} cache entries to {}",
            self.entries.len(),
            cache_file.display()
        );

        Ok(())
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for BuildCache {
    fn default() -> Self {
        Self::new(".bunkatsu-cache")
    }
}
