/// Dependency pairs that are real at the binary-package level but must not
/// become graph edges, because honoring them would create an unbreakable
/// build cycle (spec §4.E "Soft exclusions"; grounded on the
/// `oslo.config`/`oslo.log`/`oslotest` triangle called out by
/// `validated_plan.py` in the original implementation).
///
/// Each tuple is `(dependent, dependency)` and the check is directional:
/// the reverse pairing is not excluded unless listed separately.
const SOFT_DEPENDENCY_EXCLUSIONS: &[(&str, &str)] = &[
    ("oslo.config", "oslo.log"),
    ("oslo.log", "oslo.config"),
    ("oslo.config", "oslotest"),
    ("oslo.log", "oslotest"),
];

/// Whether the `dependent -> dependency` edge should be suppressed rather
/// than added to the graph.
pub fn is_soft_excluded(dependent: &str, dependency: &str) -> bool {
    SOFT_DEPENDENCY_EXCLUSIONS
        .iter()
        .any(|&(from, to)| from == dependent && to == dependency)
}
