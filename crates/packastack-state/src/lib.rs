//! Persisted, resumable run state for a `build-all` invocation
//! (`state/state.json`, spec §4.H), with atomic on-disk writes and the
//! `pending -> started -> {success, failed}` transition rules.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use packastack_core::{
    BuildStatus, BuildType, FailureType, PackageBuildState, RunState, SourcePackageName,
};

const STATE_FILE_NAME: &str = "state.json";

/// Fresh state for a new run, every package `pending`.
pub fn create_initial_state(
    run_id: impl Into<String>,
    target: impl Into<String>,
    series: impl Into<String>,
    build_type: Option<BuildType>,
    packages: &[SourcePackageName],
    build_order: Vec<SourcePackageName>,
    max_failures: Option<u32>,
    keep_going: bool,
    parallel: u32,
) -> RunState {
    let mut state = RunState {
        run_id: run_id.into(),
        target: target.into(),
        ubuntu_series: series.into(),
        build_type,
        keep_going,
        max_failures,
        parallel,
        build_order,
        packages: BTreeMap::new(),
        cycles: Vec::new(),
        missing_deps: BTreeMap::new(),
        started_at: Utc::now(),
        completed_at: None,
    };
    for package in packages {
        state.packages.insert(package.clone(), PackageBuildState::pending());
    }
    state
}

/// Reads `<dir>/state.json`. Missing, empty and malformed files are all
/// treated as absence rather than an error, per the ambient-stack
/// resilience requirement on reader paths.
pub fn load_state(dir: &Path) -> Result<Option<RunState>> {
    let path = dir.join(STATE_FILE_NAME);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).context(format!("reading {}", path.display())),
    };
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(None);
    }
    match serde_json::from_slice(&bytes) {
        Ok(state) => Ok(Some(state)),
        Err(e) => {
            tracing::warn!(
                event = "state_load_malformed",
                path = %path.display(),
                error = %e,
            );
            Ok(None)
        }
    }
}

/// Writes `<dir>/state.json` atomically: serialize to a temp file in the
/// same directory, fsync, then rename over the destination.
pub fn save_state(state: &RunState, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).context("creating state directory")?;
    let path = dir.join(STATE_FILE_NAME);
    let mut temp = tempfile::NamedTempFile::new_in(dir).context("creating temp state file")?;
    let json = serde_json::to_vec_pretty(state).context("serializing run state")?;
    temp.write_all(&json).context("writing temp state file")?;
    temp.as_file().sync_all().context("fsyncing temp state file")?;
    temp.persist(&path)
        .map_err(|e| e.error)
        .with_context(|| format!("renaming temp state file into {}", path.display()))?;
    Ok(())
}

/// Transitions `pkg` from `pending` to `started`, recording the start
/// timestamp. Errors if `pkg` is unknown or not currently `pending`.
pub fn mark_started(state: &mut RunState, pkg: &SourcePackageName) -> Result<()> {
    let entry = state
        .packages
        .get_mut(pkg)
        .with_context(|| format!("unknown package {pkg}"))?;
    anyhow::ensure!(
        entry.status == BuildStatus::Pending,
        "cannot mark_started: {pkg} is {:?}, expected pending",
        entry.status
    );
    entry.status = BuildStatus::Started;
    entry.started_at = Some(Utc::now());
    Ok(())
}

/// Transitions `pkg` from `started` to `success`, recording duration.
pub fn mark_success(
    state: &mut RunState,
    pkg: &SourcePackageName,
    log_path: Option<String>,
) -> Result<()> {
    let entry = state
        .packages
        .get_mut(pkg)
        .with_context(|| format!("unknown package {pkg}"))?;
    anyhow::ensure!(
        entry.status == BuildStatus::Started,
        "cannot mark_success: {pkg} is {:?}, expected started",
        entry.status
    );
    entry.status = BuildStatus::Success;
    entry.duration_seconds = entry
        .started_at
        .map(|started| (Utc::now() - started).num_milliseconds() as f64 / 1000.0);
    entry.log_path = log_path;
    Ok(())
}

/// Transitions `pkg` from `started` to `failed`.
pub fn mark_failed(
    state: &mut RunState,
    pkg: &SourcePackageName,
    failure_type: FailureType,
    message: impl Into<String>,
    log_path: Option<String>,
) -> Result<()> {
    let entry = state
        .packages
        .get_mut(pkg)
        .with_context(|| format!("unknown package {pkg}"))?;
    anyhow::ensure!(
        entry.status == BuildStatus::Started,
        "cannot mark_failed: {pkg} is {:?}, expected started",
        entry.status
    );
    entry.status = BuildStatus::Failed;
    entry.failure_type = Some(failure_type);
    entry.failure_message = Some(message.into());
    entry.duration_seconds = entry
        .started_at
        .map(|started| (Utc::now() - started).num_milliseconds() as f64 / 1000.0);
    entry.log_path = log_path;
    Ok(())
}

/// Resets every `failed` package to `pending` (resume with `retry_failed`).
pub fn reset_failed_to_pending(state: &mut RunState) {
    for entry in state.packages.values_mut() {
        if entry.status == BuildStatus::Failed {
            *entry = PackageBuildState::pending();
        }
    }
}

/// `true` when the run should stop launching new work: either keep-going
/// is off and at least one package has failed, or the failure count has
/// reached a positive `max_failures`.
pub fn should_stop(state: &RunState) -> bool {
    let failed = state
        .packages
        .values()
        .filter(|p| p.status == BuildStatus::Failed)
        .count();
    if !state.keep_going && failed >= 1 {
        return true;
    }
    matches!(state.max_failures, Some(max) if max > 0 && failed as u32 >= max)
}

/// Computes the virtual `blocked` status for every package: a `pending`
/// package with a failed or blocked ancestor (direct or transitive) is
/// reported as blocked rather than pending. `predecessors` returns the
/// direct dependencies of a package name; `state.build_order` is assumed
/// to list dependencies before their dependents, so a single forward
/// pass over it is enough to propagate blocking transitively.
pub fn effective_statuses(
    state: &RunState,
    predecessors: impl Fn(&str) -> Vec<String>,
) -> BTreeMap<String, BuildStatus> {
    let mut effective: BTreeMap<String, BuildStatus> = BTreeMap::new();
    for name in &state.build_order {
        let base = state
            .packages
            .get(name)
            .map(|p| p.status)
            .unwrap_or(BuildStatus::Pending);
        let status = if base == BuildStatus::Pending {
            let blocked = predecessors(name.as_str()).iter().any(|dep| {
                matches!(
                    effective.get(dep.as_str()),
                    Some(BuildStatus::Failed) | Some(BuildStatus::Blocked)
                )
            });
            if blocked {
                BuildStatus::Blocked
            } else {
                base
            }
        } else {
            base
        };
        effective.insert(name.to_string(), status);
    }
    effective
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(names: &[&str]) -> Vec<SourcePackageName> {
        names.iter().map(|n| SourcePackageName::new(*n)).collect()
    }

    #[test]
    fn round_trips_through_atomic_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_initial_state(
            "run-1",
            "devel",
            "noble",
            None,
            &names(&["nova", "glance"]),
            names(&["glance", "nova"]),
            None,
            true,
            4,
        );
        save_state(&state, dir.path()).unwrap();
        let loaded = load_state(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.run_id, "run-1");
        assert_eq!(loaded.packages.len(), 2);
    }

    #[test]
    fn load_state_tolerates_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_state(dir.path()).unwrap().is_none());

        std::fs::write(dir.path().join(STATE_FILE_NAME), b"{ not json").unwrap();
        assert!(load_state(dir.path()).unwrap().is_none());
    }

    #[test]
    fn full_transition_sequence() {
        let mut state = create_initial_state(
            "run-1",
            "devel",
            "noble",
            None,
            &names(&["nova"]),
            names(&["nova"]),
            None,
            true,
            1,
        );
        let nova = SourcePackageName::new("nova");
        mark_started(&mut state, &nova).unwrap();
        assert_eq!(state.packages[&nova].status, BuildStatus::Started);
        mark_success(&mut state, &nova, Some("log.txt".to_string())).unwrap();
        assert_eq!(state.packages[&nova].status, BuildStatus::Success);
        assert!(state.packages[&nova].duration_seconds.is_some());
    }

    #[test]
    fn mark_started_rejects_non_pending() {
        let mut state = create_initial_state(
            "run-1",
            "devel",
            "noble",
            None,
            &names(&["nova"]),
            names(&["nova"]),
            None,
            true,
            1,
        );
        let nova = SourcePackageName::new("nova");
        mark_started(&mut state, &nova).unwrap();
        assert!(mark_started(&mut state, &nova).is_err());
    }

    #[test]
    fn should_stop_without_keep_going_on_first_failure() {
        let mut state = create_initial_state(
            "run-1",
            "devel",
            "noble",
            None,
            &names(&["nova"]),
            names(&["nova"]),
            None,
            false,
            1,
        );
        let nova = SourcePackageName::new("nova");
        mark_started(&mut state, &nova).unwrap();
        mark_failed(&mut state, &nova, FailureType::Build, "boom", None).unwrap();
        assert!(should_stop(&state));
    }

    #[test]
    fn should_stop_respects_max_failures_threshold() {
        let mut state = create_initial_state(
            "run-1",
            "devel",
            "noble",
            None,
            &names(&["nova", "glance"]),
            names(&["nova", "glance"]),
            Some(2),
            true,
            1,
        );
        let nova = SourcePackageName::new("nova");
        mark_started(&mut state, &nova).unwrap();
        mark_failed(&mut state, &nova, FailureType::Build, "boom", None).unwrap();
        assert!(!should_stop(&state));

        let glance = SourcePackageName::new("glance");
        mark_started(&mut state, &glance).unwrap();
        mark_failed(&mut state, &glance, FailureType::Build, "boom", None).unwrap();
        assert!(should_stop(&state));
    }

    #[test]
    fn pending_dependent_of_failed_package_is_blocked() {
        let mut state = create_initial_state(
            "run-1",
            "devel",
            "noble",
            None,
            &names(&["base", "libA"]),
            names(&["base", "libA"]),
            None,
            true,
            1,
        );
        let base = SourcePackageName::new("base");
        mark_started(&mut state, &base).unwrap();
        mark_failed(&mut state, &base, FailureType::Build, "boom", None).unwrap();

        let statuses = effective_statuses(&state, |pkg| match pkg {
            "libA" => vec!["base".to_string()],
            _ => vec![],
        });
        assert_eq!(statuses["base"], BuildStatus::Failed);
        assert_eq!(statuses["libA"], BuildStatus::Blocked);
    }
}
