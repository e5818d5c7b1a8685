//! Module graph construction.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    Entry, EntryDecl, GraphError, Module, ModuleId, ResolveError, Resolved, Resolver,
};

/// A directed graph of modules reachable from a build's entries.
///
/// Modules are stored in discovery order: entries are walked in declaration
/// order, each breadth-first with imports visited in source order. That order
/// is the "module-graph order" used for greedy chunk filling.
#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    modules: Vec<Module>,
    index: HashMap<ModuleId, usize>,
    entries: Vec<Entry>,
}

impl ModuleGraph {
    /// Returns the module with the given id.
    pub fn module(&self, id: &ModuleId) -> Option<&Module> {
        self.index.get(id).map(|&i| &self.modules[i])
    }

    /// Returns the discovery position of a module.
    pub fn position(&self, id: &ModuleId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Returns all modules in discovery order.
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Returns the resolved entries in declaration order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Returns the number of modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns true if the graph has no modules.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Returns the positions of every module reachable from `roots`, in
    /// breadth-first order. Cycles are followed once.
    pub fn reachable_from(&self, roots: &[ModuleId]) -> Vec<usize> {
        let mut seen = vec![false; self.modules.len()];
        let mut queue = VecDeque::new();
        let mut order = Vec::new();

        for root in roots {
            if let Some(&i) = self.index.get(root)
                && !seen[i]
            {
                seen[i] = true;
                queue.push_back(i);
            }
        }

        while let Some(i) = queue.pop_front() {
            order.push(i);
            for import in &self.modules[i].imports {
                if let Some(&j) = self.index.get(import)
                    && !seen[j]
                {
                    seen[j] = true;
                    queue.push_back(j);
                }
            }
        }

        order
    }

    /// For every module (by position), the set of entry indices it is
    /// reachable from.
    pub fn entry_reachability(&self) -> Vec<BTreeSet<usize>> {
        let mut reach = vec![BTreeSet::new(); self.modules.len()];
        for (entry_index, entry) in self.entries.iter().enumerate() {
            for i in self.reachable_from(&entry.roots) {
                reach[i].insert(entry_index);
            }
        }
        reach
    }

    /// Returns the modules that import `id`, in discovery order.
    pub fn importers(&self, id: &ModuleId) -> Vec<&ModuleId> {
        self.modules
            .iter()
            .filter(|m| m.imports.contains(id))
            .map(|m| &m.id)
            .collect()
    }
}

/// Walks entries through a [`Resolver`] into a [`ModuleGraph`].
pub struct GraphBuilder<'r, R: Resolver + ?Sized> {
    resolver: &'r R,
}

impl<'r, R: Resolver + ?Sized> GraphBuilder<'r, R> {
    /// Creates a builder over the given resolver.
    pub fn new(resolver: &'r R) -> Self {
        Self { resolver }
    }

    /// Builds the graph for the given entries.
    ///
    /// Each module is loaded exactly once no matter how often it is imported,
    /// and import cycles are preserved. Any unresolved import aborts the whole
    /// build.
    pub fn build(&self, entries: &[EntryDecl]) -> Result<ModuleGraph, GraphError> {
        let mut names = HashSet::new();
        for decl in entries {
            if !names.insert(decl.name.as_str()) {
                return Err(GraphError::DuplicateEntry(decl.name.clone()));
            }
            if decl.specifiers.is_empty() {
                return Err(GraphError::EmptyEntry(decl.name.clone()));
            }
        }

        let mut graph = ModuleGraph::default();
        let mut discovered: HashSet<ModuleId> = HashSet::new();

        for decl in entries {
            let mut roots = Vec::new();
            let mut queue = VecDeque::new();

            for specifier in &decl.specifiers {
                let id = match self.resolve(None, specifier)? {
                    Resolved::Module(id) => id,
                    Resolved::Ignored => {
                        return Err(GraphError::IgnoredEntry {
                            entry: decl.name.clone(),
                            specifier: specifier.clone(),
                        });
                    }
                };
                if !roots.contains(&id) {
                    roots.push(id.clone());
                }
                if discovered.insert(id.clone()) {
                    queue.push_back(id);
                }
            }

            while let Some(id) = queue.pop_front() {
                let module = self.load_module(&id, &mut discovered, &mut queue)?;
                graph.index.insert(module.id.clone(), graph.modules.len());
                graph.modules.push(module);
            }

            debug!("Entry '{}' has {} root(s)", decl.name, roots.len());
            graph.entries.push(Entry {
                name: decl.name.clone(),
                roots,
            });
        }

        info!(
            "Built module graph: {} modules from {} entries",
            graph.modules.len(),
            graph.entries.len()
        );
        Ok(graph)
    }

    fn resolve(&self, from: Option<&ModuleId>, specifier: &str) -> Result<Resolved, GraphError> {
        self.resolver
            .resolve(from, specifier)
            .map_err(|source| GraphError::Resolution {
                from: from.cloned(),
                specifier: specifier.to_string(),
                source,
            })
    }

    fn load_module(
        &self,
        id: &ModuleId,
        discovered: &mut HashSet<ModuleId>,
        queue: &mut VecDeque<ModuleId>,
    ) -> Result<Module, GraphError> {
        let source = self
            .resolver
            .load(id)
            .map_err(|source: ResolveError| GraphError::Load {
                id: id.clone(),
                source,
            })?;

        let mut imports = Vec::with_capacity(source.imports.len());
        for specifier in &source.imports {
            match self.resolve(Some(id), specifier)? {
                Resolved::Module(target) => {
                    if !imports.contains(&target) {
                        imports.push(target.clone());
                    }
                    if discovered.insert(target.clone()) {
                        queue.push_back(target);
                    }
                }
                Resolved::Ignored => {
                    debug!("Ignoring import '{}' in {}", specifier, id);
                }
            }
        }

        Ok(Module {
            id: id.clone(),
            origin: source.origin,
            imports,
            size: source.size(),
            content_hash: blake3::hash(&source.source).to_hex().to_string(),
            source: Arc::from(source.source),
        })
    }
}
