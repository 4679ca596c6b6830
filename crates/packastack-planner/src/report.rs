use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use packastack_core::BuildType;
use packastack_depgraph::{DependencyGraph, WaveAssignment};
use serde::{Deserialize, Serialize};

/// Node status for the plan-graph report: `ok` for a normally scheduled
/// package, `cycle` when it participates in a detected SCC (wave
/// scheduling could not place it), `blocked` reserved for run-time
/// overlays that combine this report with live build state.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Ok,
    Blocked,
    Cycle,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub build_type: BuildType,
    pub status: NodeStatus,
    pub order: i32,
    pub wave: i32,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
    pub forced_by: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
}

/// The build-order dependency graph, ready for JSON emission or the
/// plain-text waves view (spec §4.G; the HTML/DOT renderers the original
/// carries are out of scope — this crate owns the data model and its
/// closest plain-text consumer).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanGraphReport {
    pub run_id: String,
    pub generated_at_utc: DateTime<Utc>,
    pub target: String,
    pub ubuntu_series: String,
    pub nodes: BTreeMap<String, GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub topo_order: Vec<String>,
    pub cycles: Vec<Vec<String>>,
    pub waves: BTreeMap<i32, Vec<String>>,
}

impl PlanGraphReport {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn wave_count(&self) -> usize {
        self.waves.len()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn build(
        run_id: impl Into<String>,
        generated_at_utc: DateTime<Utc>,
        target: impl Into<String>,
        ubuntu_series: impl Into<String>,
        graph: &DependencyGraph,
        wave_assignments: &IndexMap<String, WaveAssignment>,
        build_types: &BTreeMap<String, BuildType>,
        topo_order: Option<&[String]>,
        cycles: Vec<Vec<String>>,
    ) -> Self {
        let cycle_nodes: std::collections::BTreeSet<&str> =
            cycles.iter().flatten().map(|s| s.as_str()).collect();

        let mut nodes = BTreeMap::new();
        let mut edges = Vec::new();

        for node in graph.nodes() {
            let name = node.name.as_str();
            let dependencies = graph.dependencies_of(name);
            let dependents = graph.dependents_of(name);
            for dep in &dependencies {
                edges.push(GraphEdge {
                    from: name.to_string(),
                    to: dep.clone(),
                });
            }
            let wave = wave_assignments.get(name).map(|w| w.wave).unwrap_or(-1);
            let forced_by = wave_assignments
                .get(name)
                .map(|w| w.forced_by.iter().map(|n| n.to_string()).collect())
                .unwrap_or_default();
            let status = if cycle_nodes.contains(name) {
                NodeStatus::Cycle
            } else {
                NodeStatus::Ok
            };
            let build_type = build_types
                .get(name)
                .copied()
                .unwrap_or(BuildType::Snapshot);

            nodes.insert(
                name.to_string(),
                GraphNode {
                    id: name.to_string(),
                    build_type,
                    status,
                    order: -1,
                    wave,
                    dependencies,
                    dependents,
                    forced_by,
                },
            );
        }

        let topo_order: Vec<String> = topo_order.map(|o| o.to_vec()).unwrap_or_default();
        for (i, name) in topo_order.iter().enumerate() {
            if let Some(node) = nodes.get_mut(name) {
                node.order = i as i32;
            }
        }

        let mut waves: BTreeMap<i32, Vec<String>> = BTreeMap::new();
        for (name, assignment) in wave_assignments {
            waves.entry(assignment.wave).or_default().push(name.clone());
        }
        for bucket in waves.values_mut() {
            bucket.sort();
        }

        Self {
            run_id: run_id.into(),
            generated_at_utc,
            target: target.into(),
            ubuntu_series: ubuntu_series.into(),
            nodes,
            edges,
            topo_order,
            cycles,
            waves,
        }
    }

    /// Plain-text waves view equivalent to the original `render_waves`:
    /// one line per wave with package names annotated by build type.
    pub fn render_waves(&self, max_wave_packages: usize) -> String {
        let mut lines = Vec::new();
        lines.push("Build waves (parallelizable batches):".to_string());

        if self.waves.is_empty() {
            lines.push("  (no waves computed - graph may have cycles)".to_string());
            return lines.join("\n");
        }

        let total_packages: usize = self.waves.values().map(|v| v.len()).sum();

        for (&wave_num, names) in &self.waves {
            let count = names.len();
            let annotate = |n: &str| -> String {
                match self.nodes.get(n).map(|node| node.build_type) {
                    Some(BuildType::Snapshot) => format!("{n} (s)"),
                    Some(BuildType::Milestone) => format!("{n} (m)"),
                    _ => format!("{n} (r)"),
                }
            };
            if count <= max_wave_packages {
                let list = names.iter().map(|n| annotate(n)).collect::<Vec<_>>().join(", ");
                lines.push(format!("  Wave {wave_num} ({count}): {list}"));
            } else {
                lines.push(format!("  Wave {wave_num} ({count}):"));
                for chunk in names.chunks(max_wave_packages) {
                    let list = chunk.iter().map(|n| annotate(n)).collect::<Vec<_>>().join(", ");
                    lines.push(format!("    {list}"));
                }
            }
        }

        lines.push(String::new());
        lines.push(format!(
            "Total: {} waves, {} packages, {} dependencies",
            self.waves.len(),
            total_packages,
            self.edge_count(),
        ));

        lines.join("\n")
    }
}
