//! Graph construction errors.

use thiserror::Error;

use crate::{ModuleId, ResolveError};

/// Errors that abort graph construction. No partial graph is ever returned.
#[derive(Debug, Error)]
pub enum GraphError {
    /// An import could not be mapped to an existing module.
    #[error(
        "Unresolved import '{specifier}' in {}: {source}",
        .from.as_ref().map_or("<entry>", |id| id.as_str())
    )]
    Resolution {
        /// Importing module, `None` for entry roots.
        from: Option<ModuleId>,
        /// The raw import specifier.
        specifier: String,
        /// Underlying resolver error.
        #[source]
        source: ResolveError,
    },

    /// A resolved module could not be loaded.
    #[error("Failed to load module {id}: {source}")]
    Load {
        /// Module that failed to load.
        id: ModuleId,
        /// Underlying resolver error.
        #[source]
        source: ResolveError,
    },

    /// An entry declares no root specifiers.
    #[error("Entry '{0}' declares no modules")]
    EmptyEntry(String),

    /// Two entries share a name.
    #[error("Duplicate entry name '{0}'")]
    DuplicateEntry(String),

    /// An entry root resolved to an ignored specifier.
    #[error("Entry '{entry}' root '{specifier}' is configured as ignored")]
    IgnoredEntry {
        /// Entry name.
        entry: String,
        /// Root specifier.
        specifier: String,
    },
}

impl GraphError {
    /// Returns the unresolved specifier for resolution failures.
    pub fn specifier(&self) -> Option<&str> {
        match self {
            Self::Resolution { specifier, .. } => Some(specifier),
            Self::IgnoredEntry { specifier, .. } => Some(specifier),
            _ => None,
        }
    }
}
