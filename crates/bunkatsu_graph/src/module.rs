//! Module node types.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Unique source identifier of a module (a root-relative path with `/` separators).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    /// Creates a module id, normalizing `\` separators and a leading `./`.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into().replace('\\', "/");
        match id.strip_prefix("./") {
            Some(rest) => Self(rest.to_string()),
            None => Self(id),
        }
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ModuleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModuleId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ModuleId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Where a module comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Application source owned by the project.
    Application,
    /// Third-party dependency (e.g. under `node_modules`).
    External,
}

/// A module discovered during graph traversal. Immutable once built.
#[derive(Debug, Clone)]
pub struct Module {
    /// Module identifier.
    pub id: ModuleId,
    /// Origin classification.
    pub origin: Origin,
    /// Resolved import edges, in source order without duplicates.
    pub imports: Vec<ModuleId>,
    /// Byte size estimate.
    pub size: u64,
    /// BLAKE3 hash of the module bytes.
    pub content_hash: String,
    /// Module bytes, exactly as loaded.
    pub source: Arc<[u8]>,
}

impl Module {
    /// Returns true for third-party modules.
    pub fn is_external(&self) -> bool {
        self.origin == Origin::External
    }
}
