//! Module dependency graph using `petgraph`.
//!
//! Nodes are script units; an edge points from a dependency to the unit
//! that imports it, so a topological sort yields dependencies first. Only
//! relative imports of other script units become edges: bare specifiers are
//! external and stylesheets are injected by the host.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use kiln_common::ast::ParsedUnit;
use kiln_common::error::{KilnError, Result};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::path;

/// A dependency graph of script units.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Internal petgraph representation.
    graph: DiGraph<String, ()>,
    /// Filename to node.
    nodes: BTreeMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph from the committed parse trees of script units.
    ///
    /// Units are inserted in filename order so traversal is deterministic.
    /// Type-only imports are erased at runtime and add no edge.
    #[must_use]
    pub fn build(units: &BTreeMap<String, Arc<ParsedUnit>>) -> Self {
        let mut graph = Self::new();
        for filename in units.keys() {
            let _ = graph.add_unit(filename);
        }
        for (filename, parsed) in units {
            for specifier in parsed.import_specifiers() {
                if let Some(dependency) = resolve_local(filename, specifier, units) {
                    graph.add_dependency(filename, &dependency);
                }
            }
        }
        tracing::debug!(
            units = graph.graph.node_count(),
            edges = graph.graph.edge_count(),
            "module graph built"
        );
        graph
    }

    /// Adds a unit node, returning the existing node if already present.
    pub fn add_unit(&mut self, filename: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(filename) {
            return idx;
        }
        let idx = self.graph.add_node(filename.to_owned());
        let _ = self.nodes.insert(filename.to_owned(), idx);
        idx
    }

    /// Adds a dependency edge: `dependent` imports `dependency`.
    ///
    /// The graph edge points from `dependency` to `dependent`.
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) {
        let from = self.add_unit(dependency);
        let to = self.add_unit(dependent);
        if !self.graph.contains_edge(from, to) {
            let _ = self.graph.add_edge(from, to, ());
        }
    }

    /// Returns the sorted filenames `filename` imports.
    #[must_use]
    pub fn dependencies(&self, filename: &str) -> Vec<String> {
        self.nodes.get(filename).map_or_else(Vec::new, |&idx| {
            self.imports_of(idx)
                .into_iter()
                .map(|dep| self.graph[dep].clone())
                .collect()
        })
    }

    /// Returns every unit in filename order.
    pub fn units(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Finds a cycle, returned as a path that starts and ends at the same unit.
    ///
    /// Iterative depth-first search with an on-stack set; roots and
    /// neighbours are visited in filename order so the reported path is
    /// deterministic.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut done: BTreeSet<NodeIndex> = BTreeSet::new();
        for &root in self.nodes.values() {
            if done.contains(&root) {
                continue;
            }
            let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> = vec![(root, self.imports_of(root), 0)];
            let mut on_stack: BTreeSet<NodeIndex> = BTreeSet::from([root]);

            while let Some((node, neighbours, next)) = stack.last_mut() {
                let node = *node;
                let Some(&neighbour) = neighbours.get(*next) else {
                    let _ = on_stack.remove(&node);
                    let _ = done.insert(node);
                    let _ = stack.pop();
                    continue;
                };
                *next += 1;
                if on_stack.contains(&neighbour) {
                    let start = stack.iter().position(|(n, _, _)| *n == neighbour).unwrap_or(0);
                    let mut path: Vec<String> =
                        stack[start..].iter().map(|(n, _, _)| self.graph[*n].clone()).collect();
                    path.push(self.graph[neighbour].clone());
                    return Some(path);
                }
                if !done.contains(&neighbour) {
                    let _ = on_stack.insert(neighbour);
                    stack.push((neighbour, self.imports_of(neighbour), 0));
                }
            }
        }
        None
    }

    /// Returns every unit with dependencies before their importers.
    ///
    /// # Errors
    ///
    /// Returns [`KilnError::GraphCycle`] if the graph contains a cycle.
    pub fn order(&self) -> Result<Vec<String>> {
        petgraph::algo::toposort(&self.graph, None)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|&idx| self.graph.node_weight(idx).cloned())
                    .collect()
            })
            .map_err(|cycle| KilnError::GraphCycle {
                path: self.find_cycle().unwrap_or_else(|| {
                    let name = self.graph[cycle.node_id()].clone();
                    vec![name.clone(), name]
                }),
            })
    }

    /// Nodes imported by `idx`, sorted by filename.
    fn imports_of(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut deps: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .collect();
        deps.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        deps.dedup();
        deps
    }
}

/// Resolves a relative specifier to another script unit, if any.
fn resolve_local(
    importer: &str,
    specifier: &str,
    units: &BTreeMap<String, Arc<ParsedUnit>>,
) -> Option<String> {
    if !path::is_relative(specifier) {
        return None;
    }
    let resolved = path::resolve_relative(importer, specifier)?;
    path::candidates(&resolved)
        .into_iter()
        .find(|candidate| units.contains_key(candidate))
}

#[cfg(test)]
mod tests {
    use kiln_common::ast::{ImportItem, ImportKind, ModuleItem};

    use super::*;

    fn unit(filename: &str, imports: &[&str]) -> (String, Arc<ParsedUnit>) {
        let items = imports
            .iter()
            .map(|spec| {
                ModuleItem::Import(ImportItem {
                    kind: ImportKind::Static,
                    prefix: "import x from ".into(),
                    quote: '"',
                    specifier: (*spec).into(),
                })
            })
            .collect();
        (
            filename.to_owned(),
            Arc::new(ParsedUnit {
                filename: filename.to_owned(),
                items,
            }),
        )
    }

    fn project(units: &[(&str, &[&str])]) -> BTreeMap<String, Arc<ParsedUnit>> {
        units.iter().map(|(name, imports)| unit(name, imports)).collect()
    }

    #[test]
    fn empty_graph_resolves_to_empty() {
        let graph = DependencyGraph::new();
        assert!(graph.order().expect("should resolve").is_empty());
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn linear_chain_orders_dependencies_first() {
        let graph = DependencyGraph::build(&project(&[
            ("main.tsx", &["./utils", "react"]),
            ("utils.ts", &[]),
        ]));
        assert_eq!(graph.dependencies("main.tsx"), vec!["utils.ts"]);
        let order = graph.order().expect("should resolve");
        assert_eq!(order, vec!["utils.ts", "main.tsx"]);
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let graph = DependencyGraph::build(&project(&[
            ("a.ts", &["./b", "./c"]),
            ("b.ts", &["./d"]),
            ("c.ts", &["./d"]),
            ("d.ts", &[]),
        ]));
        assert!(graph.find_cycle().is_none());
        let order = graph.order().expect("should resolve");
        let pos = |name: &str| order.iter().position(|n| n == name).expect(name);
        assert!(pos("d.ts") < pos("b.ts"));
        assert!(pos("d.ts") < pos("c.ts"));
        assert!(pos("b.ts") < pos("a.ts"));
        assert!(pos("c.ts") < pos("a.ts"));
    }

    #[test]
    fn type_only_mutual_import_is_not_a_cycle() {
        let mut units = project(&[
            ("main.tsx", &["./component"]),
            ("component.tsx", &["./types"]),
        ]);
        let types = ParsedUnit {
            filename: "types.ts".into(),
            items: vec![ModuleItem::Import(ImportItem {
                kind: ImportKind::Static,
                prefix: "import type { Component } from ".into(),
                quote: '\'',
                specifier: "./component".into(),
            })],
        };
        let _ = units.insert("types.ts".into(), Arc::new(types));

        let graph = DependencyGraph::build(&units);
        assert!(graph.find_cycle().is_none());
        assert!(graph.dependencies("types.ts").is_empty());
        let order = graph.order().expect("should resolve");
        assert_eq!(order, vec!["types.ts", "component.tsx", "main.tsx"]);
    }

    #[test]
    fn mutual_import_is_reported_as_path() {
        let graph = DependencyGraph::build(&project(&[("a.ts", &["./b"]), ("b.ts", &["./a"])]));
        assert_eq!(
            graph.find_cycle().expect("cycle"),
            vec!["a.ts", "b.ts", "a.ts"]
        );
        let err = graph.order().expect_err("should fail");
        assert_eq!(err.to_string(), "import cycle detected: a.ts -> b.ts -> a.ts");
    }

    #[test]
    fn three_node_cycle_detection() {
        let graph = DependencyGraph::build(&project(&[
            ("main.tsx", &["./x"]),
            ("x.ts", &["./y"]),
            ("y.ts", &["./z"]),
            ("z.ts", &["./x"]),
        ]));
        assert_eq!(
            graph.find_cycle().expect("cycle"),
            vec!["x.ts", "y.ts", "z.ts", "x.ts"]
        );
    }

    #[test]
    fn self_import_is_a_cycle() {
        let graph = DependencyGraph::build(&project(&[("a.ts", &["./a.ts"])]));
        assert_eq!(graph.find_cycle().expect("cycle"), vec!["a.ts", "a.ts"]);
    }

    #[test]
    fn stylesheets_and_missing_files_are_not_edges() {
        let graph = DependencyGraph::build(&project(&[("main.tsx", &["./main.css", "./missing"])]));
        assert!(graph.dependencies("main.tsx").is_empty());
        assert_eq!(graph.units().collect::<Vec<_>>(), vec!["main.tsx"]);
    }

    #[test]
    fn nested_directories_resolve() {
        let graph = DependencyGraph::build(&project(&[
            ("components/Button.tsx", &["../lib/theme"]),
            ("lib/theme.ts", &[]),
        ]));
        assert_eq!(graph.dependencies("components/Button.tsx"), vec!["lib/theme.ts"]);
    }
}
