//! Dependency DAG over source packages, built from Debian binary build
//! dependencies, plus the wave scheduler that turns the DAG into
//! parallelizable build batches.

mod graph;
mod soft_exclusion;
mod suggestion;
mod waves;

pub use graph::{
    CycleEdge, DependencyGraph, MirCandidate, MissingDependency, PackageNode,
    ReleaseMetadataLookup, SourceIndexLookup,
};
pub use soft_exclusion::is_soft_excluded;
pub use suggestion::{suggest_cycle_breaks, CycleSuggestion, RequirementsLookup};
pub use waves::{compute_waves, get_parallel_batches, WaveAssignment};
