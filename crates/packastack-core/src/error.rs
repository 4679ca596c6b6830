use std::process::ExitCode as StdExitCode;

use thiserror::Error;

/// The stable exit-code taxonomy from the spec's error-handling design.
///
/// Every fallible path in the core converges on one of these codes; no call
/// site is meant to hand-compute a numeric exit status.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    ConfigError = 1,
    ToolMissing = 2,
    FetchFailed = 3,
    PatchFailed = 4,
    MissingPackages = 5,
    CycleDetected = 6,
    BuildFailed = 7,
    PolicyBlocked = 8,
    AllBuildFailed = 9,
    DiscoveryFailed = 10,
    ResumeError = 11,
    GraphError = 12,
}

impl ExitCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<ExitCode> for StdExitCode {
    fn from(value: ExitCode) -> Self {
        StdExitCode::from(value.code())
    }
}

/// The user-visible error taxonomy (spec §7). Each variant carries enough
/// context to render the one-line failure reason and the structured
/// `{event, package, reason, log_path?}` log fields the spec requires.
#[derive(Debug, Error)]
pub enum PackastackError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("required external tool not found on PATH: {tool}")]
    ToolMissing { tool: String },

    #[error("fetch failed for {package}: {reason}")]
    FetchFailed { package: String, reason: String },

    #[error("patch queue operation failed for {package}: {reason}")]
    PatchFailed { package: String, reason: String },

    #[error("unresolved binary dependency: {binary} (required by {required_by:?})")]
    MissingPackages {
        binary: String,
        required_by: Vec<String>,
    },

    #[error("dependency cycle detected among: {}", .cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },

    #[error("build failed for {package}: {reason}")]
    BuildFailed { package: String, reason: String },

    #[error("snapshot build of {package} blocked by policy: {reason}")]
    PolicyBlocked { package: String, reason: String },

    #[error("{failed_count} package(s) failed to build")]
    AllBuildFailed { failed_count: usize },

    #[error("discovery produced no usable packages: {reason}")]
    DiscoveryFailed { reason: String },

    #[error("cannot resume run {run_id}: prior state not found")]
    ResumeError { run_id: String },

    #[error("cannot compute build order: {reason}")]
    GraphError { reason: String },
}

impl PackastackError {
    /// The stable exit code this error maps to (spec §7 table).
    pub fn exit_code(&self) -> ExitCode {
        match self {
            PackastackError::ConfigError(_) => ExitCode::ConfigError,
            PackastackError::ToolMissing { .. } => ExitCode::ToolMissing,
            PackastackError::FetchFailed { .. } => ExitCode::FetchFailed,
            PackastackError::PatchFailed { .. } => ExitCode::PatchFailed,
            PackastackError::MissingPackages { .. } => ExitCode::MissingPackages,
            PackastackError::CycleDetected { .. } => ExitCode::CycleDetected,
            PackastackError::BuildFailed { .. } => ExitCode::BuildFailed,
            PackastackError::PolicyBlocked { .. } => ExitCode::PolicyBlocked,
            PackastackError::AllBuildFailed { .. } => ExitCode::AllBuildFailed,
            PackastackError::DiscoveryFailed { .. } => ExitCode::DiscoveryFailed,
            PackastackError::ResumeError { .. } => ExitCode::ResumeError,
            PackastackError::GraphError { .. } => ExitCode::GraphError,
        }
    }

    /// The package this error concerns, when applicable, for structured
    /// logging (`{event, package, reason, log_path?}`).
    pub fn package(&self) -> Option<&str> {
        match self {
            PackastackError::FetchFailed { package, .. }
            | PackastackError::PatchFailed { package, .. }
            | PackastackError::BuildFailed { package, .. }
            | PackastackError::PolicyBlocked { package, .. } => Some(package),
            _ => None,
        }
    }
}
