//! Cache entry types.

use serde::{Deserialize, Serialize};

/// A cache entry for a single module file.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
pub struct ModuleCacheEntry {
    /// Hash of the file content.
    pub content_hash: String,

    /// Hash of the configuration used.
    pub config_hash: String,

    /// Raw import specifiers scanned from the file, in source order.
    pub imports: Vec<String>,

    /// Timestamp when this entry was created.
    pub created_at: u64,
}

impl ModuleCacheEntry {
    /// Creates a new cache entry.
    pub fn new(content_hash: String, config_hash: String, imports: Vec<String>) -> Self {
        Self {
            content_hash,
            config_hash,
            imports,
            created_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Checks if this cache entry is valid for the given hashes.
    pub fn is_valid(&self, content_hash: &str, config_hash: &str) -> bool {
        self.content_hash == content_hash && self.config_hash == config_hash
    }
}
