use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use packastack_core::{BuildStatus, RunState, SourcePackageName};
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::graph::DependencyGraph;

/// A node's position in the wave schedule: its wave number and the
/// dependencies that pin it there (spec §4.F "Wave scheduler").
///
/// Wave 0 has no inbound dependency edges. A node in an unbroken cycle
/// cannot be placed in any wave and is assigned `-1`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WaveAssignment {
    pub wave: i32,
    pub forced_by: Vec<SourcePackageName>,
}

/// Computes a wave number and `forced_by` witness list for every node.
///
/// `wave(node) = 1 + max(wave(dep) for dep in dependencies)`, or `0` if
/// `node` has no dependencies. Nodes participating in a cycle are
/// excluded from the recursion (their dependents still get a real wave
/// computed from whatever non-cyclic dependencies they have) and are
/// themselves assigned wave `-1`.
pub fn compute_waves(graph: &DependencyGraph) -> IndexMap<String, WaveAssignment> {
    let cycle_nodes: BTreeSet<String> = graph
        .detect_cycles()
        .into_iter()
        .flatten()
        .map(|n| n.to_string())
        .collect();

    let mut memo: HashMap<NodeIndex, i32> = HashMap::new();
    for (name, &node) in graph.index() {
        wave_of(graph, node, &cycle_nodes, &mut memo);
    }

    let mut result = IndexMap::new();
    for (name, &node) in graph.index() {
        let wave = memo[&node];
        let mut forced_by: Vec<SourcePackageName> = graph
            .graph()
            .edges_directed(node, Direction::Outgoing)
            .filter_map(|edge| {
                let dep_node = edge.target();
                let dep_wave = memo[&dep_node];
                if dep_wave == wave - 1 {
                    Some(graph.graph()[dep_node].name.clone())
                } else {
                    None
                }
            })
            .collect();
        forced_by.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        result.insert(name.clone(), WaveAssignment { wave, forced_by });
    }
    result
}

fn wave_of(
    graph: &DependencyGraph,
    node: NodeIndex,
    cycle_nodes: &BTreeSet<String>,
    memo: &mut HashMap<NodeIndex, i32>,
) -> i32 {
    if let Some(&w) = memo.get(&node) {
        return w;
    }
    let name = graph.graph()[node].name.to_string();
    if cycle_nodes.contains(&name) {
        memo.insert(node, -1);
        return -1;
    }

    // Insert a provisional marker before recursing so a cycle that
    // `detect_cycles` missed (there shouldn't be one) can't recurse forever.
    memo.insert(node, -1);

    let mut max_dep_wave: Option<i32> = None;
    let deps: Vec<NodeIndex> = graph
        .graph()
        .edges_directed(node, Direction::Outgoing)
        .map(|edge| edge.target())
        .collect();
    for dep in deps {
        let dep_name = graph.graph()[dep].name.to_string();
        if cycle_nodes.contains(&dep_name) {
            continue;
        }
        let dep_wave = wave_of(graph, dep, cycle_nodes, memo);
        max_dep_wave = Some(max_dep_wave.map_or(dep_wave, |m: i32| m.max(dep_wave)));
    }

    let wave = match max_dep_wave {
        Some(m) => m + 1,
        None => 0,
    };
    memo.insert(node, wave);
    wave
}

/// Groups pending packages into ordered, non-empty parallel batches by
/// wave number, lowest first. Packages already terminal (success/failed)
/// or in progress are excluded; empty waves are skipped rather than
/// emitted as empty batches (spec §4.F "get_parallel_batches").
pub fn get_parallel_batches(
    waves: &IndexMap<String, WaveAssignment>,
    state: &RunState,
) -> Vec<Vec<SourcePackageName>> {
    let mut by_wave: std::collections::BTreeMap<i32, Vec<SourcePackageName>> =
        std::collections::BTreeMap::new();

    for (name, assignment) in waves {
        let key = SourcePackageName::new(name.clone());
        let pending = state
            .packages
            .get(&key)
            .map(|p| p.status == BuildStatus::Pending)
            .unwrap_or(false);
        if !pending {
            continue;
        }
        by_wave
            .entry(assignment.wave)
            .or_default()
            .push(SourcePackageName::new(name.clone()));
    }

    for batch in by_wave.values_mut() {
        batch.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    }

    by_wave.into_values().filter(|batch| !batch.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use packastack_core::PackageBuildState;

    fn names(names: &[&str]) -> Vec<(SourcePackageName, bool)> {
        names.iter().map(|n| (SourcePackageName::new(*n), false)).collect()
    }

    #[test]
    fn base_package_is_wave_zero() {
        let mut graph = DependencyGraph::new(names(&["base", "libA"]));
        graph.add_edge("libA", "base");
        let waves = compute_waves(&graph);
        assert_eq!(waves["base"].wave, 0);
        assert_eq!(waves["libA"].wave, 1);
        assert_eq!(waves["libA"].forced_by, vec![SourcePackageName::new("base")]);
    }

    #[test]
    fn cycle_nodes_get_wave_negative_one() {
        let mut graph = DependencyGraph::new(names(&["a", "b", "c"]));
        graph.add_edge("a", "b");
        graph.add_edge("b", "a");
        graph.add_edge("c", "a");
        let waves = compute_waves(&graph);
        assert_eq!(waves["a"].wave, -1);
        assert_eq!(waves["b"].wave, -1);
        assert_eq!(waves["c"].wave, -1);
    }

    #[test]
    fn parallel_batches_skip_non_pending_and_empty_waves() {
        let mut graph = DependencyGraph::new(names(&["base", "libA", "libB"]));
        graph.add_edge("libA", "base");
        graph.add_edge("libB", "base");
        let waves = compute_waves(&graph);

        let mut state = RunState {
            run_id: "r1".to_string(),
            target: "test".to_string(),
            ubuntu_series: "noble".to_string(),
            build_type: None,
            keep_going: true,
            max_failures: None,
            parallel: 1,
            build_order: vec![],
            packages: Default::default(),
            cycles: vec![],
            missing_deps: Default::default(),
            started_at: chrono::Utc::now(),
            completed_at: None,
        };
        state
            .packages
            .insert(SourcePackageName::new("base"), PackageBuildState::pending());
        state
            .packages
            .insert(SourcePackageName::new("libA"), PackageBuildState::pending());
        // libB already succeeded; it should not appear in any batch.
        let mut succeeded = PackageBuildState::pending();
        succeeded.status = BuildStatus::Success;
        state
            .packages
            .insert(SourcePackageName::new("libB"), succeeded);

        let batches = get_parallel_batches(&waves, &state);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], vec![SourcePackageName::new("base")]);
        assert_eq!(batches[1], vec![SourcePackageName::new("libA")]);
    }
}
