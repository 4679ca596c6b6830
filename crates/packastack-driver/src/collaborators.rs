use std::path::{Path, PathBuf};

use anyhow::Result;
use packastack_core::FailureType;

/// Outcome of fetching and checking out a project's packaging repo
/// (spec §4.I step 4).
#[derive(Clone, Debug)]
pub struct FetchOutcome {
    pub path: PathBuf,
    pub branches: Vec<String>,
    pub cloned: bool,
    pub updated: bool,
}

/// Clones/fetches the packaging Git repository for a project. A plain
/// trait rather than a concrete Git client so the driver can run against
/// an in-memory double in tests, the same idiom as
/// `packastack-depgraph::SourceIndexLookup` (spec §9).
pub trait GitFetcher {
    fn fetch_and_checkout(&self, project: &str, dest: &Path) -> Result<FetchOutcome>;
}

/// Answers whether a snapshot build is currently allowed for a project
/// under the series' release policy (spec §4.I step 3).
pub trait SnapshotPolicy {
    fn is_snapshot_eligible(&self, project: &str, series: &str) -> bool;
}

/// Where the driver reads the current plan / writes logs and artifacts
/// for this run (spec §4.I step 1, §6 persisted-state layout).
pub trait RunContext {
    fn run_dir(&self) -> &Path;
    fn log_path(&self, package: &str) -> PathBuf {
        self.run_dir().join("logs").join(format!("{package}.log"))
    }
    fn local_apt_pool_dir(&self) -> PathBuf {
        self.run_dir().join("apt-repo").join("pool")
    }
}

/// Receives run-state transitions as the driver executes (spec §4.H);
/// adapted by the caller to `packastack-state`'s `RunState` mutators so
/// this crate doesn't need to depend on that crate's concrete state type.
pub trait DriverStateSink {
    fn mark_started(&mut self, package: &str);
    fn mark_success(&mut self, package: &str, log_path: Option<String>);
    fn mark_failed(
        &mut self,
        package: &str,
        failure_type: FailureType,
        message: &str,
        log_path: Option<String>,
    );
}

/// A `DriverStateSink` that does nothing, for single-package invocations
/// that don't participate in a tracked `build-all` run.
pub struct NullStateSink;

impl DriverStateSink for NullStateSink {
    fn mark_started(&mut self, _package: &str) {}
    fn mark_success(&mut self, _package: &str, _log_path: Option<String>) {}
    fn mark_failed(
        &mut self,
        _package: &str,
        _failure_type: FailureType,
        _message: &str,
        _log_path: Option<String>,
    ) {
    }
}
