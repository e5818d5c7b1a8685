//! Cache group matching.
//!
//! Matching is a pure function of the module graph and the static group
//! configuration, so it can be re-run for incremental rebuilds.

use bunkatsu_graph::{Module, ModuleGraph, Origin};
use regex::Regex;
use tracing::debug;

use crate::BundleError;
use crate::config::{CacheGroupConfig, GroupKind};

/// A compiled cache group.
#[derive(Debug, Clone)]
pub struct CacheGroup {
    pub name: String,
    test: Option<Regex>,
    origin: Option<Origin>,
    pub priority: i32,
    pub min_chunks: usize,
    pub max_size: Option<u64>,
    pub kind: GroupKind,
}

impl CacheGroup {
    /// Compiles a group from configuration.
    pub fn compile(config: &CacheGroupConfig) -> Result<Self, BundleError> {
        let test = config
            .test
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| {
                BundleError::config(format!(
                    "Invalid test pattern for cache group '{}': {}",
                    config.name, e
                ))
            })?;

        Ok(Self {
            name: config.name.clone(),
            test,
            origin: config.origin,
            priority: config.priority,
            min_chunks: config.min_chunks.max(1),
            max_size: config.max_size,
            kind: config.kind,
        })
    }

    /// Returns true if the module satisfies the group's path and origin predicate.
    pub fn matches(&self, module: &Module) -> bool {
        if let Some(origin) = self.origin
            && module.origin != origin
        {
            return false;
        }
        match &self.test {
            Some(test) => test.is_match(module.id.as_str()),
            None => true,
        }
    }

    pub fn is_common(&self) -> bool {
        self.kind == GroupKind::Common
    }
}

/// One group a module matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// Index of the group in declaration order.
    pub group: usize,
    /// Whether the module's reuse count meets the group's `min_chunks`.
    pub eligible: bool,
}

/// Matching result for one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMatch {
    /// Module position in the graph.
    pub module: usize,
    /// Indices of the entries the module is reachable from, ascending.
    pub entries: Vec<usize>,
    /// Every matching group in declaration order.
    pub candidates: Vec<Candidate>,
}

impl ModuleMatch {
    /// Number of entries the module is reachable from.
    pub fn reuse(&self) -> usize {
        self.entries.len()
    }

    /// Returns the eligible candidates.
    pub fn eligible(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(|c| c.eligible)
    }
}

/// Evaluates every cache group against every module.
#[derive(Debug, Clone)]
pub struct CacheGroupMatcher {
    groups: Vec<CacheGroup>,
}

impl CacheGroupMatcher {
    /// Compiles the configured groups. Group names must be unique.
    pub fn new(configs: &[CacheGroupConfig]) -> Result<Self, BundleError> {
        let mut groups: Vec<CacheGroup> = Vec::with_capacity(configs.len());
        for config in configs {
            if groups.iter().any(|g| g.name == config.name) {
                return Err(BundleError::config(format!(
                    "Duplicate cache group name '{}'",
                    config.name
                )));
            }
            groups.push(CacheGroup::compile(config)?);
        }
        Ok(Self { groups })
    }

    /// Returns the compiled groups in declaration order.
    pub fn groups(&self) -> &[CacheGroup] {
        &self.groups
    }

    /// Computes the candidate groups of every module, in graph order.
    pub fn match_graph(&self, graph: &ModuleGraph) -> Vec<ModuleMatch> {
        let reach = graph.entry_reachability();

        graph
            .modules()
            .iter()
            .enumerate()
            .map(|(position, module)| {
                let entries: Vec<usize> = reach[position].iter().copied().collect();
                let reuse = entries.len();
                let candidates: Vec<Candidate> = self
                    .groups
                    .iter()
                    .enumerate()
                    .filter(|(_, group)| group.matches(module))
                    .map(|(index, group)| Candidate {
                        group: index,
                        eligible: reuse >= group.min_chunks,
                    })
                    .collect();

                debug!(
                    "{} (reused by {}): {} candidate group(s)",
                    module.id,
                    reuse,
                    candidates.len()
                );

                ModuleMatch {
                    module: position,
                    entries,
                    candidates,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bunkatsu_graph::{EntryDecl, GraphBuilder, MemoryResolver};
    use pretty_assertions::assert_eq;

    fn graph() -> ModuleGraph {
        let resolver = MemoryResolver::new()
            .app("src/a.ts", 10, &["src/shared.ts", "node_modules/react/index.js"])
            .app("src/b.ts", 10, &["src/shared.ts", "src/game/world.ts"])
            .app("src/shared.ts", 5, &[])
            .app("src/game/world.ts", 50, &[])
            .external("node_modules/react/index.js", 100, &[]);
        GraphBuilder::new(&resolver)
            .build(&[
                EntryDecl::new("a", ["src/a.ts"]),
                EntryDecl::new("b", ["src/b.ts"]),
            ])
            .unwrap()
    }

    fn matcher() -> CacheGroupMatcher {
        CacheGroupMatcher::new(&[
            CacheGroupConfig::new("vendors").origin(Origin::External).priority(10),
            CacheGroupConfig::new("game").test("(^|/)src/game/").priority(15),
            CacheGroupConfig::new("common").priority(5).min_chunks(2).common(),
        ])
        .unwrap()
    }

    fn candidates_of(matches: &[ModuleMatch], graph: &ModuleGraph, id: &str) -> Vec<(String, bool)> {
        let position = graph.position(&id.into()).unwrap();
        matches[position]
            .candidates
            .iter()
            .map(|c| (matcher().groups()[c.group].name.clone(), c.eligible))
            .collect()
    }

    #[test]
    fn test_origin_and_test_predicates() {
        let graph = graph();
        let matches = matcher().match_graph(&graph);

        assert_eq!(
            candidates_of(&matches, &graph, "node_modules/react/index.js"),
            vec![("vendors".to_string(), true), ("common".to_string(), false)]
        );
        assert_eq!(
            candidates_of(&matches, &graph, "src/game/world.ts"),
            vec![("game".to_string(), true), ("common".to_string(), false)]
        );
    }

    #[test]
    fn test_reuse_counts_entries() {
        let graph = graph();
        let matches = matcher().match_graph(&graph);
        let shared = graph.position(&"src/shared.ts".into()).unwrap();

        assert_eq!(matches[shared].reuse(), 2);
        assert_eq!(matches[shared].entries, vec![0, 1]);
        assert_eq!(
            candidates_of(&matches, &graph, "src/shared.ts"),
            vec![("common".to_string(), true)]
        );
    }

    #[test]
    fn test_matching_is_repeatable() {
        let graph = graph();
        let matcher = matcher();
        assert_eq!(matcher.match_graph(&graph), matcher.match_graph(&graph));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = CacheGroupMatcher::new(&[CacheGroupConfig::new("bad").test("(")]).unwrap_err();
        assert!(err.to_string().contains("cache group 'bad'"));
    }

    #[test]
    fn test_duplicate_group_name() {
        let err = CacheGroupMatcher::new(&[
            CacheGroupConfig::new("vendors"),
            CacheGroupConfig::new("vendors"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate cache group name 'vendors'"));
    }
}
