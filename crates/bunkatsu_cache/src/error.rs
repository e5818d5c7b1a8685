//! Build cache errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache file exists but does not decode.
    #[error("Cache file {} is corrupted: {reason}", .path.display())]
    Corrupted { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The in-memory entries could not be encoded.
    #[error("Failed to encode cache entries: {0}")]
    Encode(String),
}
