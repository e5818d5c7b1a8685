use std::collections::HashSet;

use bunkatsu_core::{Bundler, CacheGroupConfig, Config, EntryDecl, Origin};
use bunkatsu_graph::{GraphBuilder, MemoryResolver};
use proptest::prelude::*;

/// (is_external, size, imports) per module, and root indices per entry.
type GraphSpec = (Vec<(bool, u64, Vec<usize>)>, Vec<Vec<usize>>);

fn graph_spec() -> impl Strategy<Value = GraphSpec> {
    (1usize..16).prop_flat_map(|n| {
        let module = (any::<bool>(), 1u64..2000, prop::collection::vec(0..n, 0..4));
        (
            prop::collection::vec(module, n),
            prop::collection::vec(prop::collection::vec(0..n, 1..3), 1..4),
        )
    })
}

fn module_id(modules: &[(bool, u64, Vec<usize>)], i: usize) -> String {
    if modules[i].0 {
        format!("node_modules/pkg{i}/index.js")
    } else {
        format!("src/m{i}.js")
    }
}

fn resolver(spec: &GraphSpec, reversed: bool) -> MemoryResolver {
    let (modules, _) = spec;
    let mut order: Vec<usize> = (0..modules.len()).collect();
    if reversed {
        order.reverse();
    }

    order.into_iter().fold(MemoryResolver::new(), |resolver, i| {
        let (external, size, imports) = &modules[i];
        let imports: Vec<String> = imports.iter().map(|&j| module_id(modules, j)).collect();
        let imports: Vec<&str> = imports.iter().map(String::as_str).collect();
        let origin = if *external {
            Origin::External
        } else {
            Origin::Application
        };
        resolver.module(&module_id(modules, i), origin, *size, &imports)
    })
}

fn config(spec: &GraphSpec) -> Config {
    let (modules, entries) = spec;
    let mut config = Config::new();
    for (e, roots) in entries.iter().enumerate() {
        config.entries.push(EntryDecl::new(
            format!("entry{e}"),
            roots.iter().map(|&i| module_id(modules, i)),
        ));
    }
    config.cache_groups = vec![
        CacheGroupConfig::new("vendors")
            .origin(Origin::External)
            .priority(10)
            .max_size(1500),
        CacheGroupConfig::new("odd").test(r"[13579]\.js$").priority(10),
        CacheGroupConfig::new("common").priority(5).min_chunks(2).common(),
    ];
    config
}

proptest! {
    #[test]
    fn every_reachable_module_is_in_exactly_one_chunk(spec in graph_spec()) {
        let resolver = resolver(&spec, false);
        let config = config(&spec);
        let graph = GraphBuilder::new(&resolver).build(config.entries.as_slice()).unwrap();
        let output = Bundler::new(config).build_with(&resolver).unwrap();
        let manifest = &output.manifest;

        prop_assert_eq!(manifest.modules.len(), graph.len());
        let paths: HashSet<&str> = manifest.modules.iter().map(|m| m.path.as_str()).collect();
        prop_assert_eq!(paths.len(), graph.len());
        for module in graph.modules() {
            prop_assert!(paths.contains(module.id.as_str()));
            prop_assert!(manifest.chunk_for_module(module.id.as_str()).is_some());
        }
        prop_assert!(manifest.check_consistency().is_ok());
    }

    #[test]
    fn builds_are_reproducible(spec in graph_spec()) {
        let first = Bundler::new(config(&spec)).build_with(&resolver(&spec, false)).unwrap();
        let second = Bundler::new(config(&spec)).build_with(&resolver(&spec, true)).unwrap();

        prop_assert_eq!(&first.manifest, &second.manifest);
        for (a, b) in first.assets.iter().zip(&second.assets) {
            prop_assert_eq!(&a.contents, &b.contents);
        }
    }

    #[test]
    fn oversized_modules_never_fail_the_build(spec in graph_spec()) {
        let mut config = config(&spec);
        config.cache_groups[0].max_size = Some(1);
        let output = Bundler::new(config).build_with(&resolver(&spec, false));
        prop_assert!(output.is_ok());
    }
}

#[test]
fn equal_priority_and_size_resolves_to_first_declared_group() {
    let resolver = MemoryResolver::new()
        .app("src/a.js", 10, &["src/b.js", "lib/tie.js"])
        .app("src/b.js", 10, &["lib/tie.js"])
        .app("lib/tie.js", 64, &[]);

    let mut config = Config::new();
    config.entries.push(EntryDecl::new("main", ["src/a.js"]));
    config.cache_groups = vec![
        CacheGroupConfig::new("alpha").test("^lib/").priority(7),
        CacheGroupConfig::new("beta").test("tie").priority(7),
    ];

    for _ in 0..5 {
        let output = Bundler::new(config.clone()).build_with(&resolver).unwrap();
        let owner = output.manifest.chunk_for_module("lib/tie.js").unwrap();
        assert_eq!(owner.name, "alpha");
        assert!(output.manifest.chunk_named("beta").is_none());
    }
}
