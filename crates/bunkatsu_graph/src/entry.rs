//! Entry declarations.

use serde::{Deserialize, Serialize};

use crate::ModuleId;

/// A named entry as declared in configuration: one or more root specifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDecl {
    /// Entry name (also the name of its entry-specific chunk).
    pub name: String,
    /// Root specifiers, resolved relative to the project root.
    pub specifiers: Vec<String>,
}

impl EntryDecl {
    /// Creates an entry declaration.
    pub fn new<I, S>(name: impl Into<String>, specifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            specifiers: specifiers.into_iter().map(Into::into).collect(),
        }
    }
}

/// A resolved entry. Never mutated during a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Entry name.
    pub name: String,
    /// Resolved root modules in declaration order.
    pub roots: Vec<ModuleId>,
}
