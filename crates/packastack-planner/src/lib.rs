//! Plan assembly: discovery -> cross-reference -> graph construction ->
//! build-type selection -> cycle detection -> wave scheduling, composed
//! into one `PlanResult` (spec §4.G).

mod report;

pub use report::{GraphEdge, GraphNode, NodeStatus, PlanGraphReport};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use packastack_buildtype::{select_build_type, TypeSelectionInput, TypeSelectionResult};
use packastack_core::{
    BuildType, CycleStage, ExitCode, PackageStatus, RetirementInfo, SourcePackageName,
};
use packastack_depgraph::{
    compute_waves, CycleEdge, DependencyGraph, MirCandidate, MissingDependency,
    ReleaseMetadataLookup, SourceIndexLookup,
};
use packastack_release_metadata::ProjectRelease;
use tracing::instrument;

/// Everything the assembler needs besides its own algorithms, expressed
/// as narrow collaborator closures/traits so callers (the CLI, tests)
/// supply real or fake implementations without this crate depending on
/// concrete apt/release-metadata I/O (spec §9 duck-typed collaborators).
pub struct PlanInput<'a> {
    pub run_id: String,
    pub target: String,
    pub ubuntu_series: String,
    /// Source packages to plan for, in discovery order.
    pub packages: Vec<SourcePackageName>,
    pub index_lookup: &'a dyn SourceIndexLookup,
    pub release_lookup: &'a dyn ReleaseMetadataLookup,
    /// Source-package name -> whether a local packaging repo already exists.
    pub needs_rebuild_for: &'a dyn Fn(&str) -> bool,
    /// Source-package name -> deliverable name in release metadata.
    pub deliverable_for: &'a dyn Fn(&str) -> String,
    /// Deliverable name -> its `ProjectRelease`, if present in metadata.
    pub project_for: &'a dyn Fn(&str) -> Option<ProjectRelease>,
    pub cycle_stage: CycleStage,
    pub force_snapshot: bool,
    /// Source-package name -> retirement info, if known.
    pub retirement_for: &'a dyn Fn(&str) -> Option<RetirementInfo>,
    /// Source-package name -> current package status.
    pub package_status_for: &'a dyn Fn(&str) -> PackageStatus,
}

#[derive(Debug, Clone)]
pub struct PlanResult {
    pub build_order: Vec<SourcePackageName>,
    pub upload_order: Vec<SourcePackageName>,
    pub plan_graph: PlanGraphReport,
    pub mir_candidates: Vec<MirCandidate>,
    pub missing_packages: Vec<MissingDependency>,
    pub cycles: Vec<Vec<SourcePackageName>>,
    /// Edges participating in any detected cycle, for cycle-break
    /// suggestion computation (spec §4.J step 3).
    pub cycle_edges: Vec<CycleEdge>,
    pub type_selections: BTreeMap<String, TypeSelectionResult>,
    pub exit_code: ExitCode,
}

/// Runs the full assembly pipeline (spec §4.G). Expects `input.packages`
/// to already be the cross-referenced, (optionally) retirement-filtered
/// discovery result — discovery itself lives in `packastack-discovery`
/// and is composed by the caller before this function runs.
#[instrument(skip_all, fields(target = %input.target, packages = input.packages.len()))]
pub fn assemble_plan(input: PlanInput<'_>) -> PlanResult {
    if input.packages.is_empty() {
        return empty_plan(&input, ExitCode::DiscoveryFailed);
    }

    let mut graph = DependencyGraph::new(
        input
            .packages
            .iter()
            .map(|name| (name.clone(), (input.needs_rebuild_for)(name.as_str()))),
    );
    let (mir_candidates, _suppressed) =
        graph.build_edges(input.index_lookup, input.release_lookup);
    let missing_packages = graph.find_missing_dependencies(input.index_lookup);
    let cycles: Vec<Vec<SourcePackageName>> = graph.detect_cycles();
    let cycle_edges = graph.get_cycle_edges();

    let mut type_selections = BTreeMap::new();
    for name in &input.packages {
        let deliverable = (input.deliverable_for)(name.as_str());
        let project = (input.project_for)(&deliverable);
        let result = select_build_type(TypeSelectionInput {
            source_package: name.as_str(),
            deliverable: &deliverable,
            cycle_stage: input.cycle_stage,
            project: project.as_ref(),
            force_snapshot: input.force_snapshot,
            package_status: (input.package_status_for)(name.as_str()),
            retirement_info: (input.retirement_for)(name.as_str()),
        });
        type_selections.insert(name.to_string(), result);
    }

    let topo = graph.topological_sort();
    let build_order = match &topo {
        Ok(order) => order.clone(),
        Err(unreachable) => best_effort_order(&graph, unreachable),
    };

    let wave_assignments = compute_waves(&graph);
    let build_types: BTreeMap<String, BuildType> = type_selections
        .iter()
        .map(|(name, result)| (name.clone(), result.chosen_type))
        .collect();

    let topo_names: Vec<String> = build_order.iter().map(|n| n.to_string()).collect();
    let plan_graph = PlanGraphReport::build(
        input.run_id.clone(),
        Utc::now(),
        input.target.clone(),
        input.ubuntu_series.clone(),
        &graph,
        &wave_assignments,
        &build_types,
        Some(&topo_names),
        cycles.iter().map(|c| c.iter().map(|n| n.to_string()).collect()).collect(),
    );

    let exit_code = if !missing_packages.is_empty() {
        ExitCode::MissingPackages
    } else if !cycles.is_empty() || topo.is_err() {
        ExitCode::CycleDetected
    } else {
        ExitCode::Success
    };

    // Upload order mirrors build order: a package can only be published
    // once its own build artifacts exist, which is exactly the build
    // order's guarantee.
    let upload_order = build_order.clone();

    PlanResult {
        build_order,
        upload_order,
        plan_graph,
        mir_candidates,
        missing_packages,
        cycles,
        cycle_edges,
        type_selections,
        exit_code,
    }
}

/// When the full DAG can't be topologically sorted, places every node not
/// part of a cycle in deterministic name order, then appends the cycle
/// members (also name-sorted) at the end, so downstream consumers still
/// get a usable — if not fully valid — ordering alongside the reported
/// cycles.
fn best_effort_order(
    graph: &DependencyGraph,
    unreachable: &[SourcePackageName],
) -> Vec<SourcePackageName> {
    let cycle_set: std::collections::BTreeSet<&str> =
        unreachable.iter().map(|n| n.as_str()).collect();
    let mut placed: Vec<SourcePackageName> = graph
        .nodes()
        .map(|n| n.name.clone())
        .filter(|n| !cycle_set.contains(n.as_str()))
        .collect();
    placed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    let mut cycle_members: Vec<SourcePackageName> = unreachable.to_vec();
    cycle_members.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    placed.extend(cycle_members);
    placed
}

fn empty_plan(input: &PlanInput<'_>, exit_code: ExitCode) -> PlanResult {
    PlanResult {
        build_order: Vec::new(),
        upload_order: Vec::new(),
        plan_graph: PlanGraphReport::build(
            input.run_id.clone(),
            Utc::now(),
            input.target.clone(),
            input.ubuntu_series.clone(),
            &DependencyGraph::new(std::iter::empty()),
            &Default::default(),
            &BTreeMap::new(),
            None,
            Vec::new(),
        ),
        mir_candidates: Vec::new(),
        missing_packages: Vec::new(),
        cycles: Vec::new(),
        cycle_edges: Vec::new(),
        type_selections: BTreeMap::new(),
        exit_code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packastack_core::BuildType;
    use packastack_depgraph::{ReleaseMetadataLookup, SourceIndexLookup};

    struct NoopIndex;
    impl SourceIndexLookup for NoopIndex {
        fn binaries_of_source(&self, _source_package: &str) -> Vec<String> {
            Vec::new()
        }
        fn depends_of_binary(&self, _binary: &str) -> Vec<String> {
            Vec::new()
        }
        fn source_of_binary(&self, _binary: &str) -> Option<String> {
            None
        }
        fn component_of_binary(&self, _binary: &str) -> Option<String> {
            None
        }
    }
    struct NoopRelease;
    impl ReleaseMetadataLookup for NoopRelease {
        fn deliverable_to_source_package(&self, _binary_stripped: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn empty_discovery_set_yields_discovery_failed() {
        let index = NoopIndex;
        let release = NoopRelease;
        let result = assemble_plan(PlanInput {
            run_id: "run-1".to_string(),
            target: "dalmatian".to_string(),
            ubuntu_series: "noble".to_string(),
            packages: vec![],
            index_lookup: &index,
            release_lookup: &release,
            needs_rebuild_for: &|_| false,
            deliverable_for: &|n| n.to_string(),
            project_for: &|_| None,
            cycle_stage: CycleStage::PreFinal,
            force_snapshot: false,
            retirement_for: &|_| None,
            package_status_for: &|_| PackageStatus::Active,
        });
        assert_eq!(result.exit_code, ExitCode::DiscoveryFailed);
    }

    #[test]
    fn single_package_with_no_deps_plans_successfully() {
        let index = NoopIndex;
        let release = NoopRelease;
        let result = assemble_plan(PlanInput {
            run_id: "run-1".to_string(),
            target: "dalmatian".to_string(),
            ubuntu_series: "noble".to_string(),
            packages: vec![SourcePackageName::new("python-novaclient")],
            index_lookup: &index,
            release_lookup: &release,
            needs_rebuild_for: &|_| false,
            deliverable_for: &|n| n.to_string(),
            project_for: &|_| None,
            cycle_stage: CycleStage::PreFinal,
            force_snapshot: false,
            retirement_for: &|_| None,
            package_status_for: &|_| PackageStatus::Active,
        });
        assert_eq!(result.exit_code, ExitCode::Success);
        assert_eq!(result.build_order.len(), 1);
        assert_eq!(
            result.type_selections["python-novaclient"].chosen_type,
            BuildType::Release
        );
    }
}
