//! In-memory resolver.

use std::collections::{HashMap, HashSet};

use crate::{ModuleId, ModuleSource, Origin, ResolveError, Resolved, Resolver};

/// A resolver over a fixed set of modules keyed by id.
///
/// Specifiers resolve by exact id (after `./` normalization), which makes it
/// convenient for synthetic graphs.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    modules: HashMap<ModuleId, ModuleSource>,
    ignored: HashSet<String>,
}

impl MemoryResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module whose source is a placeholder derived from its id.
    pub fn module(mut self, id: &str, origin: Origin, size: u64, imports: &[&str]) -> Self {
        let source = ModuleSource::new(
            origin,
            format!("// {id}\n"),
            imports.iter().map(|s| s.to_string()).collect(),
        )
        .with_size(size);
        self.insert(id, source);
        self
    }

    /// Adds an application module.
    pub fn app(self, id: &str, size: u64, imports: &[&str]) -> Self {
        self.module(id, Origin::Application, size, imports)
    }

    /// Adds an external dependency module.
    pub fn external(self, id: &str, size: u64, imports: &[&str]) -> Self {
        self.module(id, Origin::External, size, imports)
    }

    /// Marks a specifier as ignored.
    pub fn ignore(mut self, specifier: &str) -> Self {
        self.ignored.insert(specifier.to_string());
        self
    }

    /// Inserts or replaces a module.
    pub fn insert(&mut self, id: &str, source: ModuleSource) {
        self.modules.insert(ModuleId::new(id), source);
    }

    /// Returns the number of known modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns true if no modules are known.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Resolver for MemoryResolver {
    fn resolve(&self, _from: Option<&ModuleId>, specifier: &str) -> Result<Resolved, ResolveError> {
        if self.ignored.contains(specifier) {
            return Ok(Resolved::Ignored);
        }
        let id = ModuleId::new(specifier);
        if self.modules.contains_key(&id) {
            Ok(Resolved::Module(id))
        } else {
            Err(ResolveError::NotFound(specifier.to_string()))
        }
    }

    fn load(&self, id: &ModuleId) -> Result<ModuleSource, ResolveError> {
        self.modules
            .get(id)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(id.to_string()))
    }
}
