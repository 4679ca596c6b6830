//! Shared data model for Packastack: names, build-type vocabulary, version
//! grammar, per-package build state and the error/exit-code taxonomy every
//! other `packastack-*` crate converges on.

mod build_type;
mod error;
mod names;
mod state;
pub mod version;

pub use build_type::*;
pub use error::{ExitCode, PackastackError};
pub use names::{ProjectKey, Series, SourcePackageName};
pub use state::{BuildStatus, FailureType, PackageBuildState, RunState, RunStateCounts};
