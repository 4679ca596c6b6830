//! The build-type auto-selection matrix: given a package's release-cycle
//! phase, release model and deliverable kind, choose exactly one of
//! {release, milestone, snapshot} with a machine-readable reason code.

mod kind;

pub use kind::infer_deliverable_kind;

use packastack_core::{
    BuildType, CycleStage, DeliverableKind, KindConfidence, PackageStatus, ReasonCode,
    RetirementInfo, UpstreamResolution, WatchInfo,
};
use packastack_release_metadata::ProjectRelease;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Result of type selection for a single package. Field names and order
/// mirror the original distillation's `TypeSelectionResult` verbatim.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TypeSelectionResult {
    pub source_package: String,
    pub deliverable: String,
    pub release_model: String,
    pub deliverable_kind: DeliverableKind,
    pub kind_confidence: KindConfidence,
    pub has_release_for_cycle: bool,
    pub has_beta_rc_final: bool,
    pub latest_version: String,
    pub cycle_stage: CycleStage,
    pub chosen_type: BuildType,
    pub reason_code: ReasonCode,
    pub reason_human: String,
    pub package_status: PackageStatus,
    pub upstream_resolution: Option<UpstreamResolution>,
    pub watch_info: Option<WatchInfo>,
    pub retirement_info: Option<RetirementInfo>,
}

/// Inputs to [`select_build_type`], gathered from release metadata,
/// discovery and the caller's policy flags.
pub struct TypeSelectionInput<'a> {
    pub source_package: &'a str,
    pub deliverable: &'a str,
    pub cycle_stage: CycleStage,
    pub project: Option<&'a ProjectRelease>,
    pub force_snapshot: bool,
    pub package_status: PackageStatus,
    pub retirement_info: Option<RetirementInfo>,
}

/// Runs the 14-row decision matrix (spec §4.D), first matching row wins.
/// The retirement override is applied last and unconditionally beats the
/// matrix's outcome.
#[instrument(skip(input), fields(package = input.source_package, deliverable = input.deliverable))]
pub fn select_build_type(input: TypeSelectionInput<'_>) -> TypeSelectionResult {
    let (kind, kind_confidence) =
        infer_deliverable_kind(input.project, input.source_package, input.deliverable);

    let release_model = input
        .project
        .map(|p| p.release_model.clone())
        .unwrap_or_default();
    let has_releases = input.project.map(|p| p.has_releases()).unwrap_or(false);
    let has_beta_rc_final = input
        .project
        .map(|p| p.has_beta_rc_or_final())
        .unwrap_or(false);
    let latest_version = input
        .project
        .and_then(|p| p.get_latest_version())
        .unwrap_or_default()
        .to_string();

    let is_client_or_library = matches!(kind, DeliverableKind::Client | DeliverableKind::Library);
    let in_release_metadata = input.project.is_some();

    let (chosen_type, reason_code) = select_matrix_row(MatrixFacts {
        force_snapshot: input.force_snapshot,
        in_release_metadata,
        is_client_or_library,
        cycle_stage: input.cycle_stage,
        has_releases,
        has_beta_rc_final,
        latest_release_is_final: input
            .project
            .and_then(|p| p.get_latest_release())
            .map(|r| r.is_final())
            .unwrap_or(false),
        latest_release_is_beta_or_rc: input
            .project
            .and_then(|p| p.get_latest_release())
            .map(|r| r.is_beta() || r.is_rc())
            .unwrap_or(false),
        has_upstream_artifact: input
            .project
            .and_then(|p| p.get_latest_release())
            .map(|r| !r.projects.is_empty())
            .unwrap_or(false),
        release_model: release_model.as_str(),
    });

    let mut result = TypeSelectionResult {
        source_package: input.source_package.to_string(),
        deliverable: input.deliverable.to_string(),
        release_model,
        deliverable_kind: kind,
        kind_confidence,
        has_release_for_cycle: has_releases,
        has_beta_rc_final,
        latest_version,
        cycle_stage: input.cycle_stage,
        chosen_type,
        reason_code,
        reason_human: reason_human(reason_code),
        package_status: input.package_status,
        upstream_resolution: None,
        watch_info: None,
        retirement_info: input.retirement_info.clone(),
    };

    if let Some(retirement) = &input.retirement_info {
        if retirement.retired {
            result.chosen_type = BuildType::Snapshot;
            result.reason_code = ReasonCode::RetiredProject;
            result.reason_human = reason_human(ReasonCode::RetiredProject);
            result.package_status = PackageStatus::Retired;
        }
    }

    result
}

struct MatrixFacts<'a> {
    force_snapshot: bool,
    in_release_metadata: bool,
    is_client_or_library: bool,
    cycle_stage: CycleStage,
    has_releases: bool,
    has_beta_rc_final: bool,
    latest_release_is_final: bool,
    latest_release_is_beta_or_rc: bool,
    has_upstream_artifact: bool,
    release_model: &'a str,
}

/// The 14-row matrix, spec §4.D. Written as a sequence of guarded
/// returns in table order so the "first matching row wins" rule reads
/// directly off the function body.
fn select_matrix_row(f: MatrixFacts<'_>) -> (BuildType, ReasonCode) {
    // Row 1
    if f.force_snapshot {
        return (BuildType::Snapshot, ReasonCode::SnapshotForced);
    }
    // Row 2
    if !f.in_release_metadata && f.is_client_or_library {
        return (BuildType::Release, ReasonCode::ClientLibraryNoSnapshot);
    }
    // Row 3
    if !f.in_release_metadata {
        return (BuildType::Snapshot, ReasonCode::NotInReleases);
    }

    match f.cycle_stage {
        CycleStage::PostFinal => {
            // Row 4
            if f.has_releases {
                return (BuildType::Release, ReasonCode::PostFinalRelease);
            }
            // Row 5
            if f.is_client_or_library {
                return (BuildType::Release, ReasonCode::ClientLibraryNoSnapshot);
            }
            // Row 6
            (BuildType::Snapshot, ReasonCode::PreFinalNoRelease)
        }
        CycleStage::PreFinal | CycleStage::Unknown => {
            // Row 7
            if f.latest_release_is_final {
                return (BuildType::Release, ReasonCode::HasRelease);
            }
            // Row 8
            if f.latest_release_is_beta_or_rc && f.has_upstream_artifact {
                return (BuildType::Milestone, ReasonCode::HasMilestoneOnly);
            }
            // Row 9
            if f.has_beta_rc_final {
                return (BuildType::Release, ReasonCode::HasRelease);
            }
            // Row 10
            if f.has_releases && f.release_model == "cycle-with-intermediary" {
                return (BuildType::Release, ReasonCode::IntermediaryRelease);
            }
            // Row 11
            if f.has_releases && f.release_model == "cycle-trailing" {
                return (BuildType::Release, ReasonCode::CycleTrailingRelease);
            }
            // Row 12
            if f.has_releases {
                return (BuildType::Milestone, ReasonCode::HasMilestoneOnly);
            }
            // Row 13
            if f.is_client_or_library {
                return (BuildType::Release, ReasonCode::ClientLibraryNoSnapshot);
            }
            // Row 14
            (BuildType::Snapshot, ReasonCode::NoReleaseYet)
        }
    }
}

fn reason_human(code: ReasonCode) -> String {
    match code {
        ReasonCode::HasRelease => "a beta, RC or final release already exists".to_string(),
        ReasonCode::PostFinalRelease => "series is post-final and a release exists".to_string(),
        ReasonCode::CycleTrailingRelease => {
            "cycle-trailing release model has a release".to_string()
        }
        ReasonCode::HasMilestoneOnly => "only pre-final milestone releases exist".to_string(),
        ReasonCode::IntermediaryRelease => {
            "cycle-with-intermediary release model has a release".to_string()
        }
        ReasonCode::NoReleaseYet => "no releases exist yet in this series".to_string(),
        ReasonCode::PreFinalNoRelease => "post-final series with no release (edge case)".to_string(),
        ReasonCode::NotInReleases => "project is not present in openstack/releases".to_string(),
        ReasonCode::SnapshotForced => "snapshot mode was forced by the caller".to_string(),
        ReasonCode::ClientLibraryNoSnapshot => {
            "clients and oslo libraries always use released tarballs".to_string()
        }
        ReasonCode::RetiredProject => "project is retired upstream".to_string(),
        ReasonCode::ReleaseModelUnknown => "release model could not be determined".to_string(),
        ReasonCode::CycleStageUnknown => "cycle stage could not be determined".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packastack_release_metadata::Release;

    fn project_with(release_model: &str, versions: &[&str]) -> ProjectRelease {
        project_with_artifacts(release_model, versions, true)
    }

    fn project_with_artifacts(
        release_model: &str,
        versions: &[&str],
        latest_has_artifact: bool,
    ) -> ProjectRelease {
        use packastack_release_metadata::ReleaseProject;

        let last_index = versions.len().saturating_sub(1);
        ProjectRelease {
            launchpad: None,
            release_model: release_model.to_string(),
            r#type: Some("service".to_string()),
            releases: versions
                .iter()
                .enumerate()
                .map(|(i, v)| Release {
                    version: v.to_string(),
                    projects: if i == last_index && latest_has_artifact {
                        vec![ReleaseProject {
                            repo: "openstack/nova".to_string(),
                            hash: None,
                        }]
                    } else {
                        vec![]
                    },
                })
                .collect(),
        }
    }

    #[test]
    fn forced_snapshot_wins_over_everything() {
        let project = project_with("cycle-with-rc", &["25.0.0"]);
        let result = select_build_type(TypeSelectionInput {
            source_package: "nova",
            deliverable: "nova",
            cycle_stage: CycleStage::PostFinal,
            project: Some(&project),
            force_snapshot: true,
            package_status: PackageStatus::Active,
            retirement_info: None,
        });
        assert_eq!(result.chosen_type, BuildType::Snapshot);
        assert_eq!(result.reason_code, ReasonCode::SnapshotForced);
    }

    #[test]
    fn post_final_release_selection() {
        let project = project_with("cycle-with-rc", &["25.0.0"]);
        let result = select_build_type(TypeSelectionInput {
            source_package: "nova",
            deliverable: "nova",
            cycle_stage: CycleStage::PostFinal,
            project: Some(&project),
            force_snapshot: false,
            package_status: PackageStatus::Active,
            retirement_info: None,
        });
        assert_eq!(result.chosen_type, BuildType::Release);
        assert_eq!(result.reason_code, ReasonCode::PostFinalRelease);
        assert_eq!(result.latest_version, "25.0.0");
    }

    #[test]
    fn pre_final_beta_only_selects_milestone() {
        let project = project_with("cycle-with-rc", &["26.0.0b1"]);
        let result = select_build_type(TypeSelectionInput {
            source_package: "nova",
            deliverable: "nova",
            cycle_stage: CycleStage::PreFinal,
            project: Some(&project),
            force_snapshot: false,
            package_status: PackageStatus::Active,
            retirement_info: None,
        });
        assert_eq!(result.chosen_type, BuildType::Milestone);
        assert_eq!(result.reason_code, ReasonCode::HasMilestoneOnly);
    }

    #[test]
    fn pre_final_beta_without_upstream_artifact_falls_through_to_release() {
        let project = project_with_artifacts("cycle-with-rc", &["26.0.0b1"], false);
        let result = select_build_type(TypeSelectionInput {
            source_package: "nova",
            deliverable: "nova",
            cycle_stage: CycleStage::PreFinal,
            project: Some(&project),
            force_snapshot: false,
            package_status: PackageStatus::Active,
            retirement_info: None,
        });
        assert_eq!(result.chosen_type, BuildType::Release);
        assert_eq!(result.reason_code, ReasonCode::HasRelease);
    }

    #[test]
    fn retirement_override_beats_matrix() {
        let project = project_with("cycle-with-rc", &["25.0.0"]);
        let result = select_build_type(TypeSelectionInput {
            source_package: "nova",
            deliverable: "nova",
            cycle_stage: CycleStage::PostFinal,
            project: Some(&project),
            force_snapshot: false,
            package_status: PackageStatus::Active,
            retirement_info: Some(RetirementInfo {
                retired: true,
                possibly_retired: false,
                reason: "governance entry removed".to_string(),
            }),
        });
        assert_eq!(result.chosen_type, BuildType::Snapshot);
        assert_eq!(result.reason_code, ReasonCode::RetiredProject);
        assert_eq!(result.package_status, PackageStatus::Retired);
    }

    #[test]
    fn not_in_releases_prefers_client_library_exception() {
        let result = select_build_type(TypeSelectionInput {
            source_package: "python-novaclient",
            deliverable: "python-novaclient",
            cycle_stage: CycleStage::PreFinal,
            project: None,
            force_snapshot: false,
            package_status: PackageStatus::New,
            retirement_info: None,
        });
        assert_eq!(result.chosen_type, BuildType::Release);
        assert_eq!(result.reason_code, ReasonCode::ClientLibraryNoSnapshot);
    }

    #[test]
    fn not_in_releases_otherwise_snapshots() {
        let result = select_build_type(TypeSelectionInput {
            source_package: "some-new-service",
            deliverable: "some-new-service",
            cycle_stage: CycleStage::PreFinal,
            project: None,
            force_snapshot: false,
            package_status: PackageStatus::New,
            retirement_info: None,
        });
        assert_eq!(result.chosen_type, BuildType::Snapshot);
        assert_eq!(result.reason_code, ReasonCode::NotInReleases);
    }
}
