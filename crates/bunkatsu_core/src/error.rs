//! Bundler error types.

use thiserror::Error;

/// Errors that can occur during a build.
#[derive(Debug, Error)]
pub enum BundleError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The module graph could not be built.
    #[error(transparent)]
    Graph(#[from] bunkatsu_graph::GraphError),

    /// Two chunks would share a name.
    #[error("Chunk name '{0}' is produced more than once")]
    ChunkNameConflict(String),

    /// An asset exceeds the performance budget and hints are errors.
    #[error("Asset '{name}' is {size} bytes, exceeding the limit of {limit} bytes")]
    AssetTooLarge {
        /// Chunk or entrypoint name.
        name: String,
        /// Actual size in bytes.
        size: u64,
        /// Configured limit.
        limit: u64,
    },

    /// Manifest error.
    #[error("Manifest error: {0}")]
    Manifest(#[from] bunkatsu_manifest::ManifestError),

    /// Cache error.
    #[error("Cache error: {0}")]
    Cache(#[from] bunkatsu_cache::CacheError),

    /// The runtime chunk map could not be serialized.
    #[error("Failed to serialize chunk map: {0}")]
    Serialize(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BundleError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
