//! Error types for the runtime cache.

use std::time::Duration;

use bunkatsu_manifest::IntegrityError;
use thiserror::Error;

/// Error type for network fetches.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network request failed.
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Transport failure reported by a non-HTTP fetcher.
    #[error("Network unavailable: {0}")]
    Unavailable(String),

    /// The route's network timeout elapsed.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

/// Error type for runtime cache operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A route's URL pattern is not a valid regular expression.
    #[error("Invalid URL pattern for route '{route}': {source}")]
    InvalidPattern {
        route: String,
        #[source]
        source: regex::Error,
    },

    /// A route's parameters are out of range.
    #[error("Invalid route '{route}': {reason}")]
    InvalidRoute { route: String, reason: String },

    /// Two routes share a cache name.
    #[error("Cache name '{0}' is used by more than one route")]
    DuplicateCacheName(String),

    /// A precache include/exclude glob is invalid.
    #[error("Invalid precache glob: {0}")]
    InvalidGlob(#[from] globset::Error),

    /// A URL could not be parsed or joined.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The network failed and no usable cache entry exists.
    #[error("Failed to fetch '{url}': {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    /// A precached asset was not served with status 200.
    #[error("Precache request for '{url}' returned status {status}")]
    PrecacheStatus { url: String, status: u16 },

    /// A precached asset does not match its revision.
    #[error("Integrity check failed for '{url}': {source}")]
    Integrity {
        url: String,
        #[source]
        source: IntegrityError,
    },
}

impl RuntimeError {
    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}
