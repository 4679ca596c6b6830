//! The persisted run-state model (`state/state.json`, spec §6), tracked
//! per package across a `build-all` invocation so a run can be resumed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::build_type::BuildType;
use crate::names::SourcePackageName;

/// Status of a single package within a run.
///
/// `Blocked` is a virtual status: it is never written to `state.json`, but
/// computed on read from the dependency graph (a pending package whose
/// build-order predecessor failed is reported as blocked rather than
/// pending, per the spec's resume semantics).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Pending,
    Started,
    Success,
    Failed,
    #[serde(skip_serializing)]
    Blocked,
}

/// Which phase a failure occurred in (spec §3 "Package build state").
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Fetch,
    Patch,
    MissingDep,
    Cycle,
    Build,
    Policy,
    Unknown,
}

/// Per-package state persisted across a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackageBuildState {
    pub status: BuildStatus,
    pub failure_type: Option<FailureType>,
    pub failure_message: Option<String>,
    pub log_path: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
}

impl PackageBuildState {
    pub fn pending() -> Self {
        Self {
            status: BuildStatus::Pending,
            failure_type: None,
            failure_message: None,
            log_path: None,
            started_at: None,
            duration_seconds: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, BuildStatus::Success | BuildStatus::Failed)
    }
}

/// The full `state/state.json` document for one run (spec §6 "Persisted
/// state layout").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub target: String,
    pub ubuntu_series: String,
    pub build_type: Option<BuildType>,
    pub keep_going: bool,
    pub max_failures: Option<u32>,
    pub parallel: u32,
    pub build_order: Vec<SourcePackageName>,
    pub packages: BTreeMap<SourcePackageName, PackageBuildState>,
    pub cycles: Vec<Vec<SourcePackageName>>,
    pub missing_deps: BTreeMap<String, Vec<SourcePackageName>>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunState {
    /// Counts of packages by terminal status, used for the summary report
    /// and the `EXIT_ALL_BUILD_FAILED` decision (spec §4.J).
    pub fn counts(&self) -> RunStateCounts {
        let mut counts = RunStateCounts::default();
        for state in self.packages.values() {
            match state.status {
                BuildStatus::Success => counts.success += 1,
                BuildStatus::Failed => counts.failed += 1,
                BuildStatus::Pending => counts.pending += 1,
                BuildStatus::Started => counts.started += 1,
                BuildStatus::Blocked => counts.blocked += 1,
            }
        }
        counts
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RunStateCounts {
    pub success: usize,
    pub failed: usize,
    pub pending: usize,
    pub started: usize,
    pub blocked: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_tally_by_status() {
        let mut state = RunState {
            run_id: "run-1".into(),
            target: "devel".into(),
            ubuntu_series: "noble".into(),
            build_type: None,
            keep_going: true,
            max_failures: None,
            parallel: 4,
            build_order: vec![],
            packages: BTreeMap::new(),
            cycles: vec![],
            missing_deps: BTreeMap::new(),
            started_at: Utc::now(),
            completed_at: None,
        };
        state
            .packages
            .insert(SourcePackageName::new("nova"), PackageBuildState {
                status: BuildStatus::Success,
                ..PackageBuildState::pending()
            });
        state
            .packages
            .insert(SourcePackageName::new("glance"), PackageBuildState {
                status: BuildStatus::Failed,
                ..PackageBuildState::pending()
            });
        let counts = state.counts();
        assert_eq!(counts.success, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.pending, 0);
    }
}
