use packastack_core::SourcePackageName;
use serde::{Deserialize, Serialize};

use crate::graph::CycleEdge;

/// Looks up whether `dependency` is only a test-only requirement of
/// `package`'s upstream project, read from `requirements.txt` /
/// `test-requirements.txt` (spec §4.J step 3).
pub trait RequirementsLookup {
    fn is_test_only_upstream_dependency(&self, package: &str, dependency: &str) -> bool;
}

/// A cycle-break candidate: `source` only needs `dependency` at test time
/// according to upstream's own requirements files, so the edge can be
/// safely broken (typically by adding a soft-exclusion entry) without
/// losing real build-time information.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CycleSuggestion {
    pub source: SourcePackageName,
    pub dependency: SourcePackageName,
    pub requirements_source: String,
}

/// For every edge participating in a detected cycle, proposes breaking it
/// when upstream's requirements files show it's a test-only dependency
/// (spec §4.J step 3, §8 scenario 2).
pub fn suggest_cycle_breaks(
    cycle_edges: &[CycleEdge],
    lookup: &dyn RequirementsLookup,
) -> Vec<CycleSuggestion> {
    cycle_edges
        .iter()
        .filter(|edge| {
            lookup.is_test_only_upstream_dependency(edge.from.as_str(), edge.to.as_str())
        })
        .map(|edge| CycleSuggestion {
            source: edge.from.clone(),
            dependency: edge.to.clone(),
            requirements_source: "upstream".to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeRequirements {
        test_only: &'static [(&'static str, &'static str)],
    }

    impl RequirementsLookup for FakeRequirements {
        fn is_test_only_upstream_dependency(&self, package: &str, dependency: &str) -> bool {
            self.test_only.contains(&(package, dependency))
        }
    }

    #[test]
    fn suggests_breaking_the_test_only_edge() {
        let edges = vec![
            CycleEdge {
                from: SourcePackageName::new("python-oslo.config"),
                to: SourcePackageName::new("python-oslo.log"),
            },
            CycleEdge {
                from: SourcePackageName::new("python-oslo.log"),
                to: SourcePackageName::new("python-oslo.config"),
            },
        ];
        let lookup = FakeRequirements {
            test_only: &[("python-oslo.config", "python-oslo.log")],
        };

        let suggestions = suggest_cycle_breaks(&edges, &lookup);

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].source.as_str(), "python-oslo.config");
        assert_eq!(suggestions[0].dependency.as_str(), "python-oslo.log");
        assert_eq!(suggestions[0].requirements_source, "upstream");
    }

    #[test]
    fn no_suggestion_when_no_edge_is_test_only() {
        let edges = vec![CycleEdge {
            from: SourcePackageName::new("a"),
            to: SourcePackageName::new("b"),
        }];
        let lookup = FakeRequirements { test_only: &[] };

        assert!(suggest_cycle_breaks(&edges, &lookup).is_empty());
    }
}
