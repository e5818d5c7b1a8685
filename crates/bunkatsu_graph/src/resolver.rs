//! The module resolution seam.

use thiserror::Error;

use crate::{ModuleId, Origin};

/// Outcome of resolving an import specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// The specifier maps to this module.
    Module(ModuleId),
    /// The specifier is deliberately ignored (e.g. a disabled builtin fallback).
    Ignored,
}

/// Raw module content as returned by a resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSource {
    /// Origin classification.
    pub origin: Origin,
    /// Raw module bytes. Scripts are UTF-8; assets may be anything.
    pub source: Vec<u8>,
    /// Raw import specifiers in source order.
    pub imports: Vec<String>,
    /// Explicit size estimate; defaults to the source byte length.
    pub size: Option<u64>,
}

impl ModuleSource {
    /// Creates a module source.
    pub fn new(origin: Origin, source: impl Into<Vec<u8>>, imports: Vec<String>) -> Self {
        Self {
            origin,
            source: source.into(),
            imports,
            size: None,
        }
    }

    /// Overrides the size estimate.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Returns the effective size estimate.
    pub fn size(&self) -> u64 {
        self.size.unwrap_or(self.source.len() as u64)
    }
}

/// Errors produced by a [`Resolver`].
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No module matches the specifier.
    #[error("Cannot resolve '{0}'")]
    NotFound(String),

    /// The module exists but could not be read.
    #[error("Failed to read {id}: {reason}")]
    Unreadable {
        /// Module id.
        id: ModuleId,
        /// Human-readable cause.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Maps import specifiers to modules and loads their content.
pub trait Resolver {
    /// Resolves `specifier` as imported from `from` (`None` for entry roots).
    fn resolve(&self, from: Option<&ModuleId>, specifier: &str) -> Result<Resolved, ResolveError>;

    /// Loads the content and raw imports of a resolved module.
    fn load(&self, id: &ModuleId) -> Result<ModuleSource, ResolveError>;
}

impl<R: Resolver + ?Sized> Resolver for &R {
    fn resolve(&self, from: Option<&ModuleId>, specifier: &str) -> Result<Resolved, ResolveError> {
        (**self).resolve(from, specifier)
    }

    fn load(&self, id: &ModuleId) -> Result<ModuleSource, ResolveError> {
        (**self).load(id)
    }
}
