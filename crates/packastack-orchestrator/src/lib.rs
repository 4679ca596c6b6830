//! The all-packages build driver (spec §4.J): resolves the target series,
//! loads or creates run state, honors resume/retry/skip-failed flags, runs
//! the already-assembled plan wave by wave (in parallel up to a configured
//! width), regenerates the local APT indexes, and converges on a final
//! `RunSummary` and [`ExitCode`].

use std::path::Path;

use chrono::{DateTime, Utc};
use packastack_core::{
    BuildStatus, BuildType, ExitCode, FailureType, PackastackError, RunState, RunStateCounts,
    SourcePackageName,
};
use packastack_depgraph::{suggest_cycle_breaks, RequirementsLookup};
use packastack_driver::BuildReport;
use packastack_planner::PlanResult;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Resolves a user-facing target alias (`"devel"`) to a concrete OpenStack
/// series name. A plain trait so the orchestrator doesn't need to know how
/// "the current development series" is determined (spec §2 "target").
pub trait TargetResolver {
    fn resolve_target(&self, target: &str) -> String;
}

/// Resolver that treats every target as already concrete.
pub struct IdentityResolver;

impl TargetResolver for IdentityResolver {
    fn resolve_target(&self, target: &str) -> String {
        target.to_string()
    }
}

/// Builds one package. Implemented by the caller as a thin adapter over
/// `packastack_driver::drive_single_package_build` with that package's
/// concrete collaborators wired in. `Sync` so a wave's packages can build
/// concurrently across a `rayon` thread pool.
pub trait PackageBuilder: Sync {
    fn build(&self, package: &str, build_type: BuildType) -> Result<BuildReport, PackastackError>;
}

/// Regenerates the local APT repository's indexes (spec §4.J: "once per
/// wave" under parallel execution, "after each success" under sequential).
pub trait AptIndexer: Sync {
    fn regenerate(&self) -> anyhow::Result<()>;
}

/// A [`RequirementsLookup`] that never finds a test-only dependency, for
/// callers with no upstream requirements-file data available (cycle-break
/// suggestions are then simply never produced).
pub struct NoRequirementsData;

impl RequirementsLookup for NoRequirementsData {
    fn is_test_only_upstream_dependency(&self, _package: &str, _dependency: &str) -> bool {
        false
    }
}

#[derive(Clone, Debug)]
pub struct BuildAllRequest {
    pub target: String,
    pub ubuntu_series: String,
    pub resume: bool,
    pub retry_failed: bool,
    pub skip_failed: bool,
    pub keep_going: bool,
    pub max_failures: Option<u32>,
    pub parallel: u32,
    pub dry_run: bool,
}

/// One row of the final summary, mirroring a package's terminal
/// `PackageBuildState` plus its chosen build type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackageSummary {
    pub package: String,
    pub build_type: BuildType,
    pub status: BuildStatus,
    pub failure_type: Option<FailureType>,
    pub failure_message: Option<String>,
    pub duration_seconds: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub target: String,
    pub ubuntu_series: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub waves_executed: usize,
    pub packages: Vec<PackageSummary>,
    pub counts: RunStateCounts,
    pub exit_code: u8,
}

/// Runs the whole build-all sequence and returns the final summary. `plan`
/// is the already-assembled [`PlanResult`] (discovery, cross-reference,
/// type selection and wave scheduling are the planner's job, not this
/// crate's); this function is purely about executing it.
#[instrument(skip_all, fields(target = %request.target, dry_run = request.dry_run))]
pub fn run_build_all(
    request: &BuildAllRequest,
    resolver: &dyn TargetResolver,
    plan: &PlanResult,
    requirements_lookup: &dyn RequirementsLookup,
    builder: &dyn PackageBuilder,
    indexer: &dyn AptIndexer,
    state_dir: &Path,
) -> anyhow::Result<RunSummary> {
    let resolved_series = resolver.resolve_target(&request.target);
    let started_at = Utc::now();

    // Step 3's cycle-break suggestions: non-fatal, logged alongside
    // whatever `plan.exit_code` the planner already computed for the
    // cycle itself.
    if !plan.cycle_edges.is_empty() {
        for suggestion in suggest_cycle_breaks(&plan.cycle_edges, requirements_lookup) {
            tracing::warn!(
                event = "cycle_break_suggestion",
                source = %suggestion.source,
                dependency = %suggestion.dependency,
                requirements_source = %suggestion.requirements_source,
            );
        }
    }

    let mut state = match packastack_state::load_state(state_dir)? {
        Some(existing) if request.resume => existing,
        None if request.resume => {
            return Err(PackastackError::ResumeError {
                run_id: state_dir.display().to_string(),
            }
            .into());
        }
        _ => {
            let run_id = format!("run-{}", started_at.format("%Y%m%dT%H%M%SZ"));
            packastack_state::create_initial_state(
                run_id,
                resolved_series.clone(),
                request.ubuntu_series.clone(),
                None,
                &plan.build_order,
                plan.build_order.clone(),
                request.max_failures,
                request.keep_going,
                request.parallel,
            )
        }
    };

    if request.retry_failed {
        packastack_state::reset_failed_to_pending(&mut state);
    }

    if request.dry_run {
        let rendered = plan.plan_graph.render_waves(20);
        tracing::info!(event = "dry_run_plan", waves = plan.plan_graph.wave_count(), "\n{rendered}");
        return Ok(finish(
            &request.target,
            &resolved_series,
            &request.ubuntu_series,
            &state,
            plan,
            started_at,
            true,
            0,
            ExitCode::Success,
        ));
    }

    let mut waves_executed = 0usize;
    'waves: for (_wave, members) in plan.plan_graph.waves.clone() {
        // A pending package whose dependency already failed (directly or
        // transitively) is `Blocked` rather than buildable this wave; with
        // `skip_failed` it's recorded as failed-by-blocking so a future
        // resume doesn't keep retrying it once the blocking dependency is
        // fixed up independently, instead of retrying it forever.
        let effective = packastack_state::effective_statuses(&state, |pkg| {
            plan.plan_graph
                .nodes
                .get(pkg)
                .map(|node| node.dependencies.clone())
                .unwrap_or_default()
        });

        let mut pending_this_wave: Vec<SourcePackageName> = Vec::new();
        for name in &members {
            let key = SourcePackageName::new(name.clone());
            match effective.get(name.as_str()) {
                Some(BuildStatus::Pending) => pending_this_wave.push(key),
                Some(BuildStatus::Blocked) if request.skip_failed => {
                    packastack_state::mark_started(&mut state, &key)?;
                    packastack_state::mark_failed(
                        &mut state,
                        &key,
                        FailureType::Unknown,
                        "blocked by a failed dependency",
                        None,
                    )?;
                }
                _ => {}
            }
        }
        if pending_this_wave.is_empty() {
            continue;
        }
        waves_executed += 1;

        let build_types: Vec<BuildType> = pending_this_wave
            .iter()
            .map(|name| {
                plan.type_selections
                    .get(name.as_str())
                    .map(|sel| sel.chosen_type)
                    .unwrap_or(BuildType::Snapshot)
            })
            .collect();

        for name in &pending_this_wave {
            packastack_state::mark_started(&mut state, name)?;
        }

        if request.parallel > 1 {
            // Parallel mode: the whole batch is already in flight once
            // launched, so `should_stop` can only be honored between
            // waves, not mid-wave.
            let pool = ThreadPoolBuilder::new()
                .num_threads(request.parallel as usize)
                .build()?;
            let results: Vec<(SourcePackageName, Result<BuildReport, PackastackError>)> =
                pool.install(|| {
                    use rayon::prelude::*;
                    pending_this_wave
                        .par_iter()
                        .zip(build_types.par_iter())
                        .map(|(name, build_type)| {
                            (name.clone(), builder.build(name.as_str(), *build_type))
                        })
                        .collect()
                });

            for (name, result) in results {
                record_outcome(&mut state, &name, result);
            }
            if let Err(err) = indexer.regenerate() {
                tracing::warn!(event = "apt_index_regen_failed", wave = waves_executed, error = %err);
            }
            packastack_state::save_state(&state, state_dir)?;

            if packastack_state::should_stop(&state) {
                break 'waves;
            }
        } else {
            // Sequential mode: honor `should_stop` between each package,
            // not just between waves, and regenerate the APT indexes
            // after every individual success.
            for (name, build_type) in pending_this_wave.iter().zip(build_types.iter()) {
                let result = builder.build(name.as_str(), *build_type);
                let succeeded = result.is_ok();
                record_outcome(&mut state, name, result);
                if succeeded {
                    if let Err(err) = indexer.regenerate() {
                        tracing::warn!(event = "apt_index_regen_failed", package = %name, error = %err);
                    }
                }
                packastack_state::save_state(&state, state_dir)?;
                if packastack_state::should_stop(&state) {
                    break 'waves;
                }
            }
        }
    }

    state.completed_at = Some(Utc::now());
    packastack_state::save_state(&state, state_dir)?;

    let counts = state.counts();
    let exit_code = if counts.failed == 0 {
        ExitCode::Success
    } else {
        ExitCode::AllBuildFailed
    };

    Ok(finish(
        &request.target,
        &resolved_series,
        &request.ubuntu_series,
        &state,
        plan,
        started_at,
        false,
        waves_executed,
        exit_code,
    ))
}

fn finish(
    target: &str,
    resolved_series: &str,
    ubuntu_series: &str,
    state: &RunState,
    plan: &PlanResult,
    started_at: DateTime<Utc>,
    dry_run: bool,
    waves_executed: usize,
    exit_code: ExitCode,
) -> RunSummary {
    let packages = state
        .packages
        .iter()
        .map(|(name, entry)| PackageSummary {
            package: name.to_string(),
            build_type: plan
                .type_selections
                .get(name.as_str())
                .map(|sel| sel.chosen_type)
                .unwrap_or(BuildType::Snapshot),
            status: entry.status,
            failure_type: entry.failure_type,
            failure_message: entry.failure_message.clone(),
            duration_seconds: entry.duration_seconds,
        })
        .collect();

    RunSummary {
        run_id: state.run_id.clone(),
        target: target.to_string(),
        ubuntu_series: format!("{resolved_series}/{ubuntu_series}"),
        started_at,
        finished_at: Utc::now(),
        dry_run,
        waves_executed,
        packages,
        counts: state.counts(),
        exit_code: exit_code.code(),
    }
}

fn record_outcome(
    state: &mut RunState,
    name: &SourcePackageName,
    result: Result<BuildReport, PackastackError>,
) {
    let outcome = match result {
        Ok(report) => packastack_state::mark_success(state, name, report.log_path),
        Err(err) => {
            let failure_type = failure_type_for(&err);
            packastack_state::mark_failed(state, name, failure_type, err.to_string(), None)
        }
    };
    if let Err(err) = outcome {
        tracing::error!(event = "state_transition_failed", package = %name, error = %err);
    }
}

fn failure_type_for(err: &PackastackError) -> FailureType {
    match err {
        PackastackError::ToolMissing { .. } => FailureType::Unknown,
        PackastackError::FetchFailed { .. } => FailureType::Fetch,
        PackastackError::PatchFailed { .. } => FailureType::Patch,
        PackastackError::MissingPackages { .. } => FailureType::MissingDep,
        PackastackError::CycleDetected { .. } => FailureType::Cycle,
        PackastackError::BuildFailed { .. } => FailureType::Build,
        PackastackError::PolicyBlocked { .. } => FailureType::Policy,
        _ => FailureType::Unknown,
    }
}
