use std::collections::{BTreeSet, VecDeque};

use indexmap::IndexMap;
use packastack_core::SourcePackageName;
use petgraph::algo::kosaraju_scc;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::soft_exclusion::is_soft_excluded;

/// Per-node data carried alongside the graph's identity (the node weight).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackageNode {
    pub name: SourcePackageName,
    pub needs_rebuild: bool,
}

/// A binary dependency that resolved to neither a graph node nor an entry
/// in the available binary index (spec §4.E `find_missing_dependencies`).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MissingDependency {
    pub source_package: SourcePackageName,
    pub binary_name: String,
}

/// A binary dependency found only in a non-main component (universe,
/// multiverse), recorded instead of an edge (spec §4.E step 3).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MirCandidate {
    pub source_package: SourcePackageName,
    pub binary_name: String,
    pub component: String,
}

/// One edge participating in a detected cycle (spec §4.E
/// `get_cycle_edges`).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CycleEdge {
    pub from: SourcePackageName,
    pub to: SourcePackageName,
}

/// Narrow interface over the Ubuntu/cloud-archive binary package index,
/// so edge construction doesn't depend on a concrete apt index type
/// (spec §9 "Duck-typed collaborators → interface abstractions").
pub trait SourceIndexLookup {
    /// Binary package names provided by `source_package`.
    fn binaries_of_source(&self, source_package: &str) -> Vec<String>;
    /// `Depends`/`Pre-Depends` binary names of `binary`.
    fn depends_of_binary(&self, binary: &str) -> Vec<String>;
    /// The source package that builds `binary`, if known.
    fn source_of_binary(&self, binary: &str) -> Option<String>;
    /// The archive component (`main`, `universe`, `multiverse`, ...) a
    /// binary is found in, if known.
    fn component_of_binary(&self, binary: &str) -> Option<String>;
}

/// Resolves a binary name to a source-package name via release-metadata
/// deliverables when the index lookup doesn't know it (spec §4.E step 2b).
pub trait ReleaseMetadataLookup {
    fn deliverable_to_source_package(&self, binary_stripped: &str) -> Option<String>;
}

pub struct DependencyGraph {
    graph: StableDiGraph<PackageNode, ()>,
    index: IndexMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Creates one node per target, in input order.
    pub fn new(targets: impl IntoIterator<Item = (SourcePackageName, bool)>) -> Self {
        let mut graph = StableDiGraph::new();
        let mut index = IndexMap::new();
        for (name, needs_rebuild) in targets {
            let key = name.to_string();
            let node_index = graph.add_node(PackageNode { name, needs_rebuild });
            index.insert(key, node_index);
        }
        Self { graph, index }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn node_index(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    /// Adds a directed edge `dependent -> dependency`. No-op on self-loops;
    /// de-duplicated by petgraph's `update_edge`.
    pub fn add_edge(&mut self, dependent: &str, dependency: &str) {
        if dependent == dependency {
            return;
        }
        let (Some(a), Some(b)) = (self.node_index(dependent), self.node_index(dependency)) else {
            return;
        };
        self.graph.update_edge(a, b, ());
    }

    /// Builds edges for every node from the index and release-metadata
    /// lookups (spec §4.E "Edge construction").
    #[instrument(skip_all)]
    pub fn build_edges(
        &mut self,
        index_lookup: &dyn SourceIndexLookup,
        release_lookup: &dyn ReleaseMetadataLookup,
    ) -> (Vec<MirCandidate>, Vec<CycleEdge>) {
        let mut mir_candidates = Vec::new();
        let mut suppressed = Vec::new();

        let targets: Vec<String> = self.index.keys().cloned().collect();
        for source in &targets {
            for binary in index_lookup.binaries_of_source(source) {
                for dep_binary in index_lookup.depends_of_binary(&binary) {
                    let resolved_source = index_lookup
                        .source_of_binary(&dep_binary)
                        .filter(|s| self.contains(s))
                        .or_else(|| {
                            let stripped = dep_binary
                                .strip_prefix("python3-")
                                .or_else(|| dep_binary.strip_prefix("python-"))
                                .unwrap_or(&dep_binary);
                            release_lookup
                                .deliverable_to_source_package(stripped)
                                .filter(|s| self.contains(s))
                        });

                    let Some(dependency) = resolved_source else {
                        if let Some(component) = index_lookup.component_of_binary(&dep_binary) {
                            if component != "main" {
                                mir_candidates.push(MirCandidate {
                                    source_package: SourcePackageName::new(source.clone()),
                                    binary_name: dep_binary.clone(),
                                    component,
                                });
                            }
                        }
                        continue;
                    };

                    if is_soft_excluded(source, &dependency) {
                        tracing::info!(
                            event = "soft_exclusion_suppressed",
                            source = %source,
                            dependency = %dependency,
                        );
                        suppressed.push(CycleEdge {
                            from: SourcePackageName::new(source.clone()),
                            to: SourcePackageName::new(dependency.clone()),
                        });
                        continue;
                    }

                    self.add_edge(source, &dependency);
                }
            }
        }

        (mir_candidates, suppressed)
    }

    /// Kahn's algorithm with deterministic secondary ordering by name
    /// among equal-indegree nodes. `Err` carries the unreachable nodes
    /// (those still in a cycle) when the sort can't place every node.
    pub fn topological_sort(&self) -> Result<Vec<SourcePackageName>, Vec<SourcePackageName>> {
        let mut indegree: IndexMap<NodeIndex, usize> = IndexMap::new();
        for node in self.graph.node_indices() {
            indegree.insert(node, self.graph.edges_directed(node, Direction::Incoming).count());
        }

        let mut ready: Vec<NodeIndex> = indegree
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&node, _)| node)
            .collect();
        sort_by_name(&self.graph, &mut ready);

        let mut order = Vec::new();
        let mut queue: VecDeque<NodeIndex> = ready.into_iter().collect();

        while let Some(node) = queue.pop_front() {
            order.push(self.graph[node].name.clone());
            let mut newly_ready = Vec::new();
            for edge in self
                .graph
                .edges_directed(node, Direction::Incoming)
                .collect::<Vec<_>>()
            {
                let dependent = edge.source();
                let count = indegree.get_mut(&dependent).unwrap();
                *count -= 1;
                if *count == 0 {
                    newly_ready.push(dependent);
                }
            }
            sort_by_name(&self.graph, &mut newly_ready);
            for node in newly_ready {
                queue.push_back(node);
            }
        }

        if order.len() == self.graph.node_count() {
            Ok(order)
        } else {
            let placed: BTreeSet<&str> = order.iter().map(|n| n.as_str()).collect();
            let unreachable = self
                .graph
                .node_indices()
                .map(|n| self.graph[n].name.clone())
                .filter(|name| !placed.contains(name.as_str()))
                .collect();
            Err(unreachable)
        }
    }

    /// Tarjan-family SCC detection via `kosaraju_scc`; returns components
    /// of size >= 2 (a disallowed self-loop would also qualify, kept for
    /// defensiveness per spec §4.E).
    pub fn detect_cycles(&self) -> Vec<Vec<SourcePackageName>> {
        kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() >= 2
                    || (scc.len() == 1 && self.graph.contains_edge(scc[0], scc[0]))
            })
            .map(|scc| scc.into_iter().map(|n| self.graph[n].name.clone()).collect())
            .collect()
    }

    /// The set of edges participating in any detected SCC.
    pub fn get_cycle_edges(&self) -> Vec<CycleEdge> {
        let sccs = detect_cycle_node_sets(&self.graph);
        let mut edges = Vec::new();
        for edge in self.graph.edge_references_all() {
            let (from, to) = edge;
            if sccs.iter().any(|scc| scc.contains(&from) && scc.contains(&to)) {
                edges.push(CycleEdge {
                    from: self.graph[from].name.clone(),
                    to: self.graph[to].name.clone(),
                });
            }
        }
        edges
    }

    /// For each node, binary dep names resolving neither to a graph node
    /// nor to a package present in `index_lookup` (spec §4.E).
    pub fn find_missing_dependencies(
        &self,
        index_lookup: &dyn SourceIndexLookup,
    ) -> Vec<MissingDependency> {
        let mut missing = Vec::new();
        for (name, &node) in &self.index {
            let package = &self.graph[node].name;
            for binary in index_lookup.binaries_of_source(name) {
                for dep_binary in index_lookup.depends_of_binary(&binary) {
                    let known = index_lookup.source_of_binary(&dep_binary).is_some();
                    if !known {
                        missing.push(MissingDependency {
                            source_package: package.clone(),
                            binary_name: dep_binary,
                        });
                    }
                }
            }
        }
        missing
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PackageNode> {
        self.graph.node_indices().map(move |n| &self.graph[n])
    }

    /// Names of `name`'s direct dependencies (must-build-before set).
    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        let Some(node) = self.node_index(name) else {
            return Vec::new();
        };
        let mut deps: Vec<String> = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .map(|edge| self.graph[edge.target()].name.to_string())
            .collect();
        deps.sort();
        deps
    }

    /// Names of `name`'s direct dependents (must-build-after set).
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        let Some(node) = self.node_index(name) else {
            return Vec::new();
        };
        let mut dependents: Vec<String> = self
            .graph
            .edges_directed(node, Direction::Incoming)
            .map(|edge| self.graph[edge.source()].name.to_string())
            .collect();
        dependents.sort();
        dependents
    }

    pub(crate) fn graph(&self) -> &StableDiGraph<PackageNode, ()> {
        &self.graph
    }

    pub(crate) fn index(&self) -> &IndexMap<String, NodeIndex> {
        &self.index
    }
}

fn sort_by_name(graph: &StableDiGraph<PackageNode, ()>, nodes: &mut [NodeIndex]) {
    nodes.sort_by(|a, b| graph[*a].name.as_str().cmp(graph[*b].name.as_str()));
}

fn detect_cycle_node_sets(graph: &StableDiGraph<PackageNode, ()>) -> Vec<BTreeSet<NodeIndex>> {
    kosaraju_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() >= 2 || (scc.len() == 1 && graph.contains_edge(scc[0], scc[0])))
        .map(|scc| scc.into_iter().collect())
        .collect()
}

trait EdgeReferencesAll {
    fn edge_references_all(&self) -> Vec<(NodeIndex, NodeIndex)>;
}

impl EdgeReferencesAll for StableDiGraph<PackageNode, ()> {
    fn edge_references_all(&self) -> Vec<(NodeIndex, NodeIndex)> {
        self.edge_indices()
            .filter_map(|e| self.edge_endpoints(e))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeIndex {
        binaries: std::collections::BTreeMap<&'static str, Vec<&'static str>>,
        depends: std::collections::BTreeMap<&'static str, Vec<&'static str>>,
        source_of: std::collections::BTreeMap<&'static str, &'static str>,
    }

    impl SourceIndexLookup for FakeIndex {
        fn binaries_of_source(&self, source_package: &str) -> Vec<String> {
            self.binaries
                .get(source_package)
                .map(|v| v.iter().map(|s| s.to_string()).collect())
                .unwrap_or_default()
        }
        fn depends_of_binary(&self, binary: &str) -> Vec<String> {
            self.depends
                .get(binary)
                .map(|v| v.iter().map(|s| s.to_string()).collect())
                .unwrap_or_default()
        }
        fn source_of_binary(&self, binary: &str) -> Option<String> {
            self.source_of.get(binary).map(|s| s.to_string())
        }
        fn component_of_binary(&self, _binary: &str) -> Option<String> {
            Some("main".to_string())
        }
    }

    struct NoopReleaseLookup;
    impl ReleaseMetadataLookup for NoopReleaseLookup {
        fn deliverable_to_source_package(&self, _binary_stripped: &str) -> Option<String> {
            None
        }
    }

    fn names(names: &[&str]) -> Vec<(SourcePackageName, bool)> {
        names.iter().map(|n| (SourcePackageName::new(*n), false)).collect()
    }

    #[test]
    fn topological_sort_orders_base_before_dependents() {
        let mut graph = DependencyGraph::new(names(&["base", "libA", "libB"]));
        graph.add_edge("libA", "base");
        graph.add_edge("libB", "base");
        let order = graph.topological_sort().unwrap();
        assert_eq!(order[0].as_str(), "base");
        assert!(order.iter().any(|n| n.as_str() == "libA"));
        assert!(order.iter().any(|n| n.as_str() == "libB"));
    }

    #[test]
    fn no_self_loops() {
        let mut graph = DependencyGraph::new(names(&["nova"]));
        graph.add_edge("nova", "nova");
        assert_eq!(graph.detect_cycles().len(), 0);
    }

    #[test]
    fn detects_two_node_cycle() {
        let mut graph = DependencyGraph::new(names(&["a", "b"]));
        graph.add_edge("a", "b");
        graph.add_edge("b", "a");
        assert!(graph.topological_sort().is_err());
        assert_eq!(graph.detect_cycles().len(), 1);
    }

    #[test]
    fn soft_exclusion_suppresses_oslo_config_to_oslo_log() {
        let index = FakeIndex {
            binaries: [("python-oslo.config", vec!["python3-oslo.config"])].into(),
            depends: [("python3-oslo.config", vec!["python3-oslo.log"])].into(),
            source_of: [("python3-oslo.log", "python-oslo.log")].into(),
        };
        let mut graph = DependencyGraph::new(names(&["python-oslo.config", "python-oslo.log"]));
        let (_mir, suppressed) = graph.build_edges(&index, &NoopReleaseLookup);
        assert_eq!(suppressed.len(), 1);
        assert!(graph.topological_sort().is_ok());
    }

    #[test]
    fn records_mir_candidate_for_non_main_component() {
        struct UniverseIndex;
        impl SourceIndexLookup for UniverseIndex {
            fn binaries_of_source(&self, _s: &str) -> Vec<String> {
                vec!["nova-bin".to_string()]
            }
            fn depends_of_binary(&self, _b: &str) -> Vec<String> {
                vec!["some-universe-lib".to_string()]
            }
            fn source_of_binary(&self, _b: &str) -> Option<String> {
                None
            }
            fn component_of_binary(&self, _b: &str) -> Option<String> {
                Some("universe".to_string())
            }
        }
        let mut graph = DependencyGraph::new(names(&["nova"]));
        let (mir, _suppressed) = graph.build_edges(&UniverseIndex, &NoopReleaseLookup);
        assert_eq!(mir.len(), 1);
        assert_eq!(mir[0].component, "universe");
    }
}
