//! Chunk selection.
//!
//! Every module ends up in exactly one chunk. Entry roots stay in their
//! entry's chunk; other modules go to their best eligible cache group, ranked
//! by priority, then by the group's total eligible size, then by declaration
//! order. Modules with no eligible group fall back to the chunk of the first
//! entry that reaches them.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use bunkatsu_graph::{ModuleGraph, ModuleId};
use bunkatsu_manifest::ChunkKind;
use tracing::{debug, info, warn};

use crate::BundleError;
use crate::config::GroupKind;
use crate::matcher::{CacheGroup, ModuleMatch};

/// A chunk before ids and fingerprints are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChunk {
    pub name: String,
    pub kind: ChunkKind,
    /// Producing cache group, for group and common chunks.
    pub group: Option<String>,
    /// Owning entry index, for entry chunks.
    pub entry: Option<usize>,
    /// Module positions in graph order.
    pub modules: Vec<usize>,
    /// Combined module size.
    pub size: u64,
}

/// A module larger than its group's `max_size`, placed alone in its own chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeOverflow {
    pub group: String,
    pub module: ModuleId,
    pub size: u64,
    pub max_size: u64,
}

/// The final chunk partition of a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Runtime chunk first, then entry chunks in declaration order, then
    /// explicit group chunks, then common chunks, groups in declaration order.
    pub chunks: Vec<PlannedChunk>,
    /// Chunk index of every module, by graph position.
    pub owner: Vec<usize>,
    pub overflows: Vec<SizeOverflow>,
}

impl Partition {
    /// Returns the chunk holding a module position.
    pub fn chunk_of(&self, position: usize) -> &PlannedChunk {
        &self.chunks[self.owner[position]]
    }

    /// Returns the chunk with the given name.
    pub fn chunk_named(&self, name: &str) -> Option<&PlannedChunk> {
        self.chunks.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    Entry(usize),
    Group(usize),
}

/// Resolves module ownership and materializes chunks.
#[derive(Debug, Clone)]
pub struct ChunkSelector<'g> {
    groups: &'g [CacheGroup],
    runtime_chunk: Option<String>,
}

impl<'g> ChunkSelector<'g> {
    pub fn new(groups: &'g [CacheGroup], runtime_chunk: Option<String>) -> Self {
        Self {
            groups,
            runtime_chunk,
        }
    }

    /// Partitions the graph. `matches` must come from the same graph and groups.
    pub fn select(
        &self,
        graph: &ModuleGraph,
        matches: &[ModuleMatch],
    ) -> Result<Partition, BundleError> {
        let modules = graph.modules();

        let mut pinned: HashMap<usize, usize> = HashMap::new();
        for (entry_index, entry) in graph.entries().iter().enumerate() {
            for root in &entry.roots {
                if let Some(position) = graph.position(root) {
                    pinned.entry(position).or_insert(entry_index);
                }
            }
        }
        let totals = self.group_totals(graph, matches, &pinned);

        let owners: Vec<Owner> = matches
            .iter()
            .map(|m| {
                let owner = if let Some(&entry) = pinned.get(&m.module) {
                    Owner::Entry(entry)
                } else if let Some(group) = self
                    .best(m, GroupKind::Explicit, &totals)
                    .or_else(|| self.best(m, GroupKind::Common, &totals))
                {
                    Owner::Group(group)
                } else {
                    Owner::Entry(m.entries.first().copied().unwrap_or_default())
                };
                debug!("{} -> {:?}", modules[m.module].id, owner);
                owner
            })
            .collect();

        let mut chunks = Vec::new();
        let mut overflows = Vec::new();

        if let Some(name) = &self.runtime_chunk {
            chunks.push(PlannedChunk {
                name: name.clone(),
                kind: ChunkKind::Runtime,
                group: None,
                entry: None,
                modules: Vec::new(),
                size: 0,
            });
        }

        for (entry_index, entry) in graph.entries().iter().enumerate() {
            let members = positions_owned_by(&owners, Owner::Entry(entry_index));
            chunks.push(PlannedChunk {
                name: entry.name.clone(),
                kind: ChunkKind::Entry,
                group: None,
                entry: Some(entry_index),
                size: members.iter().map(|&p| modules[p].size).sum(),
                modules: members,
            });
        }

        for kind in [GroupKind::Explicit, GroupKind::Common] {
            for (index, group) in self.groups.iter().enumerate() {
                if group.kind != kind {
                    continue;
                }
                let members = positions_owned_by(&owners, Owner::Group(index));
                if members.is_empty() {
                    continue;
                }

                let parts = split_greedy(graph, group, &members, &mut overflows);
                let split = parts.len() > 1;
                if split {
                    info!("Cache group '{}' split into {} chunks", group.name, parts.len());
                }
                for (n, part) in parts.into_iter().enumerate() {
                    chunks.push(PlannedChunk {
                        name: if split {
                            format!("{}-{}", group.name, n)
                        } else {
                            group.name.clone()
                        },
                        kind: match kind {
                            GroupKind::Explicit => ChunkKind::Group,
                            GroupKind::Common => ChunkKind::Common,
                        },
                        group: Some(group.name.clone()),
                        entry: None,
                        size: part.iter().map(|&p| modules[p].size).sum(),
                        modules: part,
                    });
                }
            }
        }

        let mut names = HashSet::new();
        for chunk in &chunks {
            if !names.insert(chunk.name.as_str()) {
                return Err(BundleError::ChunkNameConflict(chunk.name.clone()));
            }
        }

        let mut owner = vec![0; modules.len()];
        for (chunk_index, chunk) in chunks.iter().enumerate() {
            for &position in &chunk.modules {
                owner[position] = chunk_index;
            }
        }

        info!(
            "Partitioned {} modules into {} chunks",
            modules.len(),
            chunks.len()
        );

        Ok(Partition {
            chunks,
            owner,
            overflows,
        })
    }

    /// Sum of module sizes for which each group is an eligible candidate.
    /// Pinned entry roots never join a group and are not counted.
    fn group_totals(
        &self,
        graph: &ModuleGraph,
        matches: &[ModuleMatch],
        pinned: &HashMap<usize, usize>,
    ) -> Vec<u64> {
        let mut totals = vec![0u64; self.groups.len()];
        for m in matches.iter().filter(|m| !pinned.contains_key(&m.module)) {
            let size = graph.modules()[m.module].size;
            for candidate in m.eligible() {
                totals[candidate.group] += size;
            }
        }
        totals
    }

    fn best(&self, m: &ModuleMatch, kind: GroupKind, totals: &[u64]) -> Option<usize> {
        m.eligible()
            .filter(|c| self.groups[c.group].kind == kind)
            .max_by_key(|c| {
                (
                    self.groups[c.group].priority,
                    totals[c.group],
                    Reverse(c.group),
                )
            })
            .map(|c| c.group)
    }
}

fn positions_owned_by(owners: &[Owner], owner: Owner) -> Vec<usize> {
    owners
        .iter()
        .enumerate()
        .filter(|(_, o)| **o == owner)
        .map(|(position, _)| position)
        .collect()
}

/// Fills parts greedily in graph order, starting a new part whenever the next
/// module would push the current one past `max_size`.
fn split_greedy(
    graph: &ModuleGraph,
    group: &CacheGroup,
    members: &[usize],
    overflows: &mut Vec<SizeOverflow>,
) -> Vec<Vec<usize>> {
    let Some(max_size) = group.max_size else {
        return vec![members.to_vec()];
    };

    let mut parts = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_size = 0u64;

    for &position in members {
        let module = &graph.modules()[position];
        if !current.is_empty() && current_size + module.size > max_size {
            parts.push(std::mem::take(&mut current));
            current_size = 0;
        }
        if module.size > max_size {
            warn!(
                "Module {} ({} bytes) exceeds max_size {} of cache group '{}'; emitting it alone",
                module.id, module.size, max_size, group.name
            );
            overflows.push(SizeOverflow {
                group: group.name.clone(),
                module: module.id.clone(),
                size: module.size,
                max_size,
            });
        }
        current.push(position);
        current_size += module.size;
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheGroupConfig;
    use crate::matcher::CacheGroupMatcher;
    use bunkatsu_graph::{EntryDecl, GraphBuilder, MemoryResolver, Origin};
    use pretty_assertions::assert_eq;

    fn run(
        resolver: &MemoryResolver,
        entries: &[EntryDecl],
        groups: &[CacheGroupConfig],
        runtime: Option<&str>,
    ) -> (ModuleGraph, Partition) {
        let graph = GraphBuilder::new(resolver).build(entries).unwrap();
        let matcher = CacheGroupMatcher::new(groups).unwrap();
        let matches = matcher.match_graph(&graph);
        let partition = ChunkSelector::new(matcher.groups(), runtime.map(String::from))
            .select(&graph, &matches)
            .unwrap();
        (graph, partition)
    }

    fn chunk_name_of<'p>(graph: &ModuleGraph, partition: &'p Partition, id: &str) -> &'p str {
        let position = graph.position(&id.into()).unwrap();
        &partition.chunk_of(position).name
    }

    fn names_of(graph: &ModuleGraph, chunk: &PlannedChunk) -> Vec<String> {
        chunk
            .modules
            .iter()
            .map(|&p| graph.modules()[p].id.to_string())
            .collect()
    }

    #[test]
    fn test_highest_priority_wins() {
        let resolver = MemoryResolver::new()
            .app("src/index.ts", 10, &["node_modules/react/index.js"])
            .external("node_modules/react/index.js", 100, &[]);
        let (graph, partition) = run(
            &resolver,
            &[EntryDecl::new("main", ["src/index.ts"])],
            &[
                CacheGroupConfig::new("vendors").origin(Origin::External).priority(10),
                CacheGroupConfig::new("react").test("node_modules/react/").priority(20),
            ],
            Some("runtime"),
        );

        assert_eq!(chunk_name_of(&graph, &partition, "node_modules/react/index.js"), "react");
        let names: Vec<_> = partition.chunks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["runtime", "main", "react"]);
        assert_eq!(partition.chunks[0].kind, ChunkKind::Runtime);
        assert!(partition.chunks[0].modules.is_empty());
    }

    #[test]
    fn test_equal_priority_larger_total_wins() {
        // "wide" is eligible for two modules, "narrow" for one.
        let resolver = MemoryResolver::new()
            .app("src/index.ts", 1, &["lib/shared.ts", "lib/wide/other.ts"])
            .app("lib/shared.ts", 10, &[])
            .app("lib/wide/other.ts", 10, &[]);
        let (graph, partition) = run(
            &resolver,
            &[EntryDecl::new("main", ["src/index.ts"])],
            &[
                CacheGroupConfig::new("narrow").test("shared").priority(1),
                CacheGroupConfig::new("wide").test("^lib/").priority(1),
            ],
            None,
        );

        assert_eq!(chunk_name_of(&graph, &partition, "lib/shared.ts"), "wide");
        assert!(partition.chunk_named("narrow").is_none());
    }

    #[test]
    fn test_pinned_root_does_not_count_toward_group_total() {
        // The large root matches "a" but stays in its entry chunk, so "b"
        // ends up the larger group.
        let resolver = MemoryResolver::new()
            .app("lib/root-a.ts", 1000, &["lib/m.ts", "lib/n.ts"])
            .app("lib/m.ts", 10, &[])
            .app("lib/n.ts", 10, &[]);
        let (graph, partition) = run(
            &resolver,
            &[EntryDecl::new("main", ["lib/root-a.ts"])],
            &[
                CacheGroupConfig::new("b").test("^lib/(m|n)").priority(1),
                CacheGroupConfig::new("a").test("^lib/(root|m)").priority(1),
            ],
            None,
        );

        assert_eq!(chunk_name_of(&graph, &partition, "lib/root-a.ts"), "main");
        assert_eq!(chunk_name_of(&graph, &partition, "lib/m.ts"), "b");
        assert_eq!(partition.chunk_named("b").unwrap().size, 20);
        assert!(partition.chunk_named("a").is_none());
    }

    #[test]
    fn test_equal_priority_equal_size_first_declared_wins() {
        let resolver = MemoryResolver::new()
            .app("src/index.ts", 1, &["lib/tie.ts"])
            .app("lib/tie.ts", 10, &[]);
        let groups = [
            CacheGroupConfig::new("first").test("tie").priority(3),
            CacheGroupConfig::new("second").test("tie").priority(3),
        ];
        let (graph, partition) = run(
            &resolver,
            &[EntryDecl::new("main", ["src/index.ts"])],
            &groups,
            None,
        );
        assert_eq!(chunk_name_of(&graph, &partition, "lib/tie.ts"), "first");

        let reversed = [groups[1].clone(), groups[0].clone()];
        let (graph, partition) = run(
            &resolver,
            &[EntryDecl::new("main", ["src/index.ts"])],
            &reversed,
            None,
        );
        assert_eq!(chunk_name_of(&graph, &partition, "lib/tie.ts"), "second");
    }

    #[test]
    fn test_min_chunks_threshold_and_common() {
        let resolver = MemoryResolver::new()
            .app("src/a.ts", 1, &["src/shared.ts", "src/only-a.ts"])
            .app("src/b.ts", 1, &["src/shared.ts"])
            .app("src/shared.ts", 5, &[])
            .app("src/only-a.ts", 5, &[]);
        let (graph, partition) = run(
            &resolver,
            &[EntryDecl::new("a", ["src/a.ts"]), EntryDecl::new("b", ["src/b.ts"])],
            &[CacheGroupConfig::new("common").priority(5).min_chunks(2).common()],
            Some("runtime"),
        );

        assert_eq!(chunk_name_of(&graph, &partition, "src/shared.ts"), "common");
        assert_eq!(chunk_name_of(&graph, &partition, "src/only-a.ts"), "a");
        assert_eq!(partition.chunk_named("common").unwrap().kind, ChunkKind::Common);
    }

    #[test]
    fn test_common_only_when_no_explicit_group_is_eligible() {
        let resolver = MemoryResolver::new()
            .app("src/a.ts", 1, &["node_modules/x/index.js"])
            .app("src/b.ts", 1, &["node_modules/x/index.js"])
            .external("node_modules/x/index.js", 5, &[]);
        let (graph, partition) = run(
            &resolver,
            &[EntryDecl::new("a", ["src/a.ts"]), EntryDecl::new("b", ["src/b.ts"])],
            &[
                CacheGroupConfig::new("common").priority(50).min_chunks(2).common(),
                CacheGroupConfig::new("vendors").origin(Origin::External).priority(1),
            ],
            None,
        );

        assert_eq!(chunk_name_of(&graph, &partition, "node_modules/x/index.js"), "vendors");
        assert!(partition.chunk_named("common").is_none());
    }

    #[test]
    fn test_unmatched_shared_module_goes_to_first_entry() {
        let resolver = MemoryResolver::new()
            .app("src/a.ts", 1, &["src/shared.ts"])
            .app("src/b.ts", 1, &["src/shared.ts"])
            .app("src/shared.ts", 5, &[]);
        let (graph, partition) = run(
            &resolver,
            &[EntryDecl::new("b", ["src/b.ts"]), EntryDecl::new("a", ["src/a.ts"])],
            &[],
            None,
        );

        assert_eq!(chunk_name_of(&graph, &partition, "src/shared.ts"), "b");
    }

    #[test]
    fn test_entry_roots_are_pinned() {
        let resolver = MemoryResolver::new()
            .external("node_modules/react/index.js", 50, &["node_modules/react/jsx.js"])
            .external("node_modules/react/jsx.js", 10, &[]);
        let (graph, partition) = run(
            &resolver,
            &[EntryDecl::new("vendor", ["node_modules/react/index.js"])],
            &[CacheGroupConfig::new("vendors").origin(Origin::External).priority(10)],
            None,
        );

        assert_eq!(chunk_name_of(&graph, &partition, "node_modules/react/index.js"), "vendor");
        assert_eq!(chunk_name_of(&graph, &partition, "node_modules/react/jsx.js"), "vendors");
    }

    #[test]
    fn test_max_size_splits_greedily_in_graph_order() {
        let resolver = MemoryResolver::new()
            .app("src/index.ts", 1, &["v/a.js", "v/b.js", "v/c.js", "v/d.js"])
            .app("v/a.js", 40, &[])
            .app("v/b.js", 40, &[])
            .app("v/c.js", 40, &[])
            .app("v/d.js", 10, &[]);
        let (graph, partition) = run(
            &resolver,
            &[EntryDecl::new("main", ["src/index.ts"])],
            &[CacheGroupConfig::new("v").test("^v/").max_size(90)],
            None,
        );

        let v0 = partition.chunk_named("v-0").unwrap();
        let v1 = partition.chunk_named("v-1").unwrap();
        assert_eq!(names_of(&graph, v0), vec!["v/a.js", "v/b.js"]);
        assert_eq!(names_of(&graph, v1), vec!["v/c.js", "v/d.js"]);
        assert_eq!(v0.size, 80);
        assert_eq!(v1.group.as_deref(), Some("v"));
        assert!(partition.chunk_named("v").is_none());
        assert!(partition.overflows.is_empty());
    }

    #[test]
    fn test_oversized_module_is_isolated() {
        let resolver = MemoryResolver::new()
            .app("src/index.ts", 1, &["v/small.js", "v/huge.js", "v/tail.js"])
            .app("v/small.js", 10, &[])
            .app("v/huge.js", 500, &[])
            .app("v/tail.js", 10, &[]);
        let (graph, partition) = run(
            &resolver,
            &[EntryDecl::new("main", ["src/index.ts"])],
            &[CacheGroupConfig::new("v").test("^v/").max_size(100)],
            None,
        );

        let parts: Vec<Vec<String>> = ["v-0", "v-1", "v-2"]
            .iter()
            .map(|name| names_of(&graph, partition.chunk_named(name).unwrap()))
            .collect();
        assert_eq!(
            parts,
            vec![
                vec!["v/small.js".to_string()],
                vec!["v/huge.js".to_string()],
                vec!["v/tail.js".to_string()],
            ]
        );
        assert_eq!(
            partition.overflows,
            vec![SizeOverflow {
                group: "v".to_string(),
                module: ModuleId::from("v/huge.js"),
                size: 500,
                max_size: 100,
            }]
        );
    }

    #[test]
    fn test_chunk_name_conflict() {
        let resolver = MemoryResolver::new()
            .app("src/index.ts", 1, &["lib/x.ts"])
            .app("lib/x.ts", 1, &[]);
        let graph = GraphBuilder::new(&resolver)
            .build(&[EntryDecl::new("main", ["src/index.ts"])])
            .unwrap();
        let matcher = CacheGroupMatcher::new(&[CacheGroupConfig::new("main").test("^lib/")]).unwrap();
        let matches = matcher.match_graph(&graph);
        let err = ChunkSelector::new(matcher.groups(), None)
            .select(&graph, &matches)
            .unwrap_err();
        assert!(matches!(err, BundleError::ChunkNameConflict(name) if name == "main"));
    }
}
