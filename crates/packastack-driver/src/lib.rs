//! Single-package build driver (spec §4.I): fetch, patch, build, publish
//! one source package end to end, converging on a stable [`ExitCode`] no
//! matter which step fails.

mod changelog;
mod collaborators;
mod patchqueue;
mod signature;
mod tarball;

pub use changelog::{read_current_version, write_changelog_entry, NextVersion};
pub use collaborators::{DriverStateSink, FetchOutcome, GitFetcher, NullStateSink, RunContext, SnapshotPolicy};
pub use patchqueue::{export_patch_queue, import_patch_queue, PatchQueueOutcome};
pub use signature::{
    scrub_embedded_signing_keys, verify_signature, SignatureFetcher, SignatureOutcome,
};
pub use tarball::{acquire_tarball, AcquiredTarball, TarballChecksums, TarballFetcher};

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use chrono::{DateTime, Utc};
use packastack_core::version::DebianVersion;
use packastack_core::{BuildType, ExitCode, FailureType, PackastackError};
use packastack_upstream::ResolvedUpstream;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// External tools the driver shells out to; checked up front so a missing
/// tool fails fast with `TOOL_MISSING` instead of mid-sequence (spec §4.I
/// step 2).
pub const REQUIRED_TOOLS: &[&str] = &[
    "git",
    "gbp",
    "dpkg-buildpackage",
    "dpkg-deb",
    "dch",
    "uscan",
    "gpg",
    "apt-ftparchive",
];

const BINARY_BUILD_TOOL: &str = "sbuild";

/// Timeout applied to the single long-running external build invocation
/// (`gbp buildpackage -S`, and `sbuild` when binary builds are requested).
/// The spec treats a timeout here as an ordinary `BUILD_FAILED`, not a
/// distinct exit code.
const BUILD_TIMEOUT: Duration = Duration::from_secs(3600);

/// Everything needed to drive a single package's build, the single-package
/// analogue of `packastack-orchestrator`'s `BuildAllRequest`.
#[derive(Clone, Debug)]
pub struct BuildRequest {
    pub package: String,
    pub target: String,
    pub ubuntu_series: String,
    pub cloud_archive: Option<String>,
    pub build_type: BuildType,
    pub milestone_tag: Option<String>,
    pub binary: bool,
    pub force: bool,
    pub run_dir: PathBuf,
}

/// Per-package outcome, the unit of record both for a single invocation's
/// exit code and for one row of `packastack-orchestrator`'s summary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildReport {
    pub package: String,
    pub build_type: BuildType,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub new_version: Option<String>,
    pub log_path: Option<String>,
    pub exit_code: u8,
}

/// Everything the driver needs from the outside world, collected into one
/// struct of `&dyn Trait` collaborators so callers can assemble either the
/// real implementations or in-memory test doubles (spec §9).
pub struct Collaborators<'a> {
    pub git: &'a dyn GitFetcher,
    pub tarball: &'a dyn TarballFetcher,
    pub signature: &'a dyn SignatureFetcher,
    pub snapshot_policy: &'a dyn SnapshotPolicy,
    pub upstream: &'a ResolvedUpstream,
    pub run_context: &'a dyn RunContext,
    pub state_sink: &'a mut dyn DriverStateSink,
}

/// Runs the full 14-step sequence for one package (spec §4.I). Returns
/// `Ok(report)` on success; any failing step produces a [`PackastackError`]
/// whose [`PackastackError::exit_code`] is the process's exit status.
#[instrument(skip_all, fields(package = %request.package, build_type = %request.build_type))]
pub fn drive_single_package_build(
    request: &BuildRequest,
    collaborators: &mut Collaborators<'_>,
) -> Result<BuildReport, PackastackError> {
    let started_at = Utc::now();
    collaborators.state_sink.mark_started(&request.package);

    let outcome = run_steps(request, collaborators, started_at);

    match &outcome {
        Ok(report) => {
            collaborators
                .state_sink
                .mark_success(&request.package, report.log_path.clone());
        }
        Err(err) => {
            let log_path = Some(path_to_string(
                &collaborators.run_context.log_path(&request.package),
            ));
            collaborators.state_sink.mark_failed(
                &request.package,
                failure_type_for(err),
                &err.to_string(),
                log_path,
            );
        }
    }
    outcome
}

fn run_steps(
    request: &BuildRequest,
    collaborators: &mut Collaborators<'_>,
    started_at: DateTime<Utc>,
) -> Result<BuildReport, PackastackError> {
    // Step 2: tool check.
    for tool in REQUIRED_TOOLS {
        if !packastack_procutil::tool_on_path(tool) {
            return Err(PackastackError::ToolMissing {
                tool: (*tool).to_string(),
            });
        }
    }
    if request.binary && !packastack_procutil::tool_on_path(BINARY_BUILD_TOOL) {
        return Err(PackastackError::ToolMissing {
            tool: BINARY_BUILD_TOOL.to_string(),
        });
    }

    // Step 3: policy gate. Only a snapshot build can be blocked; release
    // and milestone builds draw from an upstream tag/tarball that already
    // passed the openstack-releases gate upstream of this driver.
    if request.build_type == BuildType::Snapshot && !request.force {
        if !collaborators
            .snapshot_policy
            .is_snapshot_eligible(&request.package, &request.ubuntu_series)
        {
            return Err(PackastackError::PolicyBlocked {
                package: request.package.clone(),
                reason: "snapshot builds are not currently permitted for this series".to_string(),
            });
        }
    }

    // Step 4: fetch and checkout the packaging repository.
    let package_dir = collaborators.run_context.run_dir().join(&request.package);
    let fetch = collaborators
        .git
        .fetch_and_checkout(&request.package, &package_dir)
        .map_err(|err| PackastackError::FetchFailed {
            package: request.package.clone(),
            reason: err.to_string(),
        })?;

    // Step 5: upstream selection.
    let deliverable = &collaborators.upstream.deliverable;
    let requested_version = request
        .milestone_tag
        .clone()
        .unwrap_or_else(|| "latest".to_string());

    // Step 6: tarball acquisition (release/milestone only; snapshot builds
    // derive their source directly from the fetched packaging repo's
    // upstream branch rather than a published tarball).
    let acquired = if request.build_type != BuildType::Snapshot {
        let want_sha512 = matches!(
            collaborators.upstream.config.signatures.mode,
            packastack_core::SignatureMode::Required
        );
        Some(
            acquire_tarball(
                collaborators.tarball,
                &collaborators.upstream.config.tarball.prefer,
                deliverable,
                &requested_version,
                &fetch.path,
                want_sha512,
            )
            .map_err(|err| PackastackError::FetchFailed {
                package: request.package.clone(),
                reason: err.to_string(),
            })?,
        )
    } else {
        None
    };

    // Step 7: signature policy. Verify the acquired tarball per
    // `signature_mode` (only the `official` method publishes one); then,
    // for snapshot builds only, scrub any embedded signing keys out of
    // the packaging repo's `debian/upstream/` (release/milestone builds
    // retain them so downstream verification tooling has something to
    // check against).
    if let Some(acquired) = &acquired {
        signature::verify_signature(
            collaborators.signature,
            collaborators.upstream.config.signatures.mode,
            acquired.method,
            &acquired.path,
            deliverable,
            &requested_version,
            &fetch.path,
        )
        .map_err(|err| PackastackError::FetchFailed {
            package: request.package.clone(),
            reason: err.to_string(),
        })?;
    }
    if request.build_type == BuildType::Snapshot {
        signature::scrub_embedded_signing_keys(&fetch.path).map_err(|err| {
            PackastackError::FetchFailed {
                package: request.package.clone(),
                reason: format!("scrubbing embedded signing keys: {err}"),
            }
        })?;
    }

    // Step 8: import the upstream source via gbp import-orig.
    if let Some(acquired) = &acquired {
        packastack_procutil::run_and_check(
            Command::new("gbp")
                .current_dir(&fetch.path)
                .arg("import-orig")
                .arg("--no-interactive")
                .arg(&acquired.path),
        )
        .map_err(|err| PackastackError::FetchFailed {
            package: request.package.clone(),
            reason: err.to_string(),
        })?;
    }

    // Step 9: changelog.
    let changelog_path = fetch.path.join("debian/changelog");
    let current_version = read_current_version(&changelog_path)
        .map_err(|err| PackastackError::BuildFailed {
            package: request.package.clone(),
            reason: format!("reading current changelog version: {err}"),
        })?;
    let next_version_spec = match request.build_type {
        BuildType::Release => NextVersion::Release {
            new_upstream: &requested_version,
        },
        BuildType::Milestone => NextVersion::Milestone {
            new_upstream: &requested_version,
            milestone: request.milestone_tag.as_deref().unwrap_or("b1"),
        },
        BuildType::Snapshot => NextVersion::Snapshot {
            upstream: &requested_version,
        },
    };
    let new_version = write_changelog_entry(
        &fetch.path,
        request.build_type,
        &current_version,
        next_version_spec,
        &request.ubuntu_series,
        "automated build",
    )
    .map_err(|err| PackastackError::BuildFailed {
        package: request.package.clone(),
        reason: format!("writing changelog entry: {err}"),
    })?;

    // Step 10: patch queue import/export.
    import_patch_queue(&fetch.path, request.force).map_err(|err| PackastackError::PatchFailed {
        package: request.package.clone(),
        reason: err.to_string(),
    })?;
    export_patch_queue(&fetch.path).map_err(|err| PackastackError::PatchFailed {
        package: request.package.clone(),
        reason: err.to_string(),
    })?;

    // Step 11: source build.
    run_timed(
        Command::new("gbp")
            .current_dir(&fetch.path)
            .arg("buildpackage")
            .arg("-S")
            .arg("--git-ignore-new"),
        &request.package,
    )?;

    // Step 12: optional binary build via sbuild.
    if request.binary {
        run_timed(
            Command::new("sbuild")
                .current_dir(&fetch.path)
                .arg(format!("--dist={}", request.ubuntu_series)),
            &request.package,
        )?;
    }

    // Step 13: publish into the local APT pool and refresh indexes.
    publish_artifacts(&fetch.path, collaborators.run_context, &request.package)?;

    let finished_at = Utc::now();
    Ok(BuildReport {
        package: request.package.clone(),
        build_type: request.build_type,
        started_at,
        finished_at,
        new_version: Some(new_version.to_string()),
        log_path: Some(path_to_string(
            &collaborators.run_context.log_path(&request.package),
        )),
        exit_code: ExitCode::Success.code(),
    })
}

fn run_timed(cmd: &mut Command, package: &str) -> Result<(), PackastackError> {
    match packastack_procutil::run_with_timeout(cmd, BUILD_TIMEOUT) {
        Ok(packastack_procutil::TimedRunOutcome::Exited(status)) if status.success() => Ok(()),
        Ok(packastack_procutil::TimedRunOutcome::Exited(status)) => {
            Err(PackastackError::BuildFailed {
                package: package.to_string(),
                reason: format!("exited with {status}"),
            })
        }
        Ok(packastack_procutil::TimedRunOutcome::TimedOut) => Err(PackastackError::BuildFailed {
            package: package.to_string(),
            reason: format!("timed out after {}s", BUILD_TIMEOUT.as_secs()),
        }),
        Err(err) => Err(PackastackError::BuildFailed {
            package: package.to_string(),
            reason: err.to_string(),
        }),
    }
}

/// Step 14: copy built `.dsc`/`.changes`/`.deb` artifacts into the local
/// APT pool and regenerate its indexes with `apt-ftparchive`.
fn publish_artifacts(
    package_dir: &Path,
    run_context: &dyn RunContext,
    package: &str,
) -> Result<(), PackastackError> {
    let pool_dir = run_context.local_apt_pool_dir();
    std::fs::create_dir_all(&pool_dir).map_err(|err| PackastackError::BuildFailed {
        package: package.to_string(),
        reason: format!("creating apt pool dir: {err}"),
    })?;

    let parent = package_dir.parent().unwrap_or(package_dir);
    let entries = std::fs::read_dir(parent).map_err(|err| PackastackError::BuildFailed {
        package: package.to_string(),
        reason: format!("listing build output dir: {err}"),
    })?;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_artifact = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext, "dsc" | "changes" | "deb" | "buildinfo" | "tar.gz" | "tar.xz" | "tar.bz2"))
            .unwrap_or(false);
        if is_artifact {
            let dest = pool_dir.join(path.file_name().unwrap());
            std::fs::copy(&path, &dest).map_err(|err| PackastackError::BuildFailed {
                package: package.to_string(),
                reason: format!("copying {} into apt pool: {err}", path.display()),
            })?;
        }
    }

    packastack_procutil::run_and_check(
        Command::new("apt-ftparchive")
            .current_dir(&pool_dir)
            .arg("packages")
            .arg("."),
    )
    .map_err(|err| PackastackError::BuildFailed {
        package: package.to_string(),
        reason: format!("regenerating apt indexes: {err}"),
    })
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
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

#[cfg(test)]
mod tests {
    use super::*;
    use packastack_core::{ReleaseSourceConfig, ReleaseSourceType, SignatureMode, SignaturesConfig, TarballConfig};

    struct AlwaysDenySnapshot;
    impl SnapshotPolicy for AlwaysDenySnapshot {
        fn is_snapshot_eligible(&self, _project: &str, _series: &str) -> bool {
            false
        }
    }

    struct FakeRunContext {
        dir: PathBuf,
    }
    impl RunContext for FakeRunContext {
        fn run_dir(&self) -> &Path {
            &self.dir
        }
    }

    struct NoopGit;
    impl GitFetcher for NoopGit {
        fn fetch_and_checkout(&self, _project: &str, dest: &Path) -> anyhow::Result<FetchOutcome> {
            std::fs::create_dir_all(dest)?;
            Ok(FetchOutcome {
                path: dest.to_path_buf(),
                branches: vec!["upstream".to_string()],
                cloned: true,
                updated: false,
            })
        }
    }

    struct NoopTarball;
    impl TarballFetcher for NoopTarball {
        fn fetch(
            &self,
            _method: packastack_core::TarballMethod,
            _project: &str,
            _version: &str,
            _dest_dir: &Path,
        ) -> anyhow::Result<PathBuf> {
            Err(anyhow::anyhow!("no network in tests"))
        }
    }

    struct NoopSignature;
    impl SignatureFetcher for NoopSignature {
        fn fetch_signature(
            &self,
            _project: &str,
            _version: &str,
            _dest_dir: &Path,
        ) -> anyhow::Result<Option<PathBuf>> {
            Ok(None)
        }
    }

    fn sample_upstream() -> ResolvedUpstream {
        ResolvedUpstream {
            config: packastack_core::UpstreamConfig {
                tarball: TarballConfig::default(),
                signatures: SignaturesConfig {
                    mode: SignatureMode::Auto,
                },
                release_source: ReleaseSourceConfig {
                    source_type: ReleaseSourceType::OpenstackReleases,
                },
            },
            release_source: ReleaseSourceConfig {
                source_type: ReleaseSourceType::OpenstackReleases,
            },
            deliverable: "nova".to_string(),
            explicit: false,
        }
    }

    #[test]
    fn snapshot_build_blocked_by_policy_yields_policy_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let git = NoopGit;
        let tarball = NoopTarball;
        let policy = AlwaysDenySnapshot;
        let upstream = sample_upstream();
        let run_context = FakeRunContext {
            dir: dir.path().to_path_buf(),
        };
        let mut sink = NullStateSink;
        let signature = NoopSignature;
        let mut collaborators = Collaborators {
            git: &git,
            tarball: &tarball,
            signature: &signature,
            snapshot_policy: &policy,
            upstream: &upstream,
            run_context: &run_context,
            state_sink: &mut sink,
        };
        let request = BuildRequest {
            package: "nova".to_string(),
            target: "dalmatian".to_string(),
            ubuntu_series: "noble".to_string(),
            cloud_archive: None,
            build_type: BuildType::Snapshot,
            milestone_tag: None,
            binary: false,
            force: false,
            run_dir: dir.path().to_path_buf(),
        };
        let result = drive_single_package_build(&request, &mut collaborators);
        assert!(matches!(result, Err(PackastackError::PolicyBlocked { .. })));
    }

    #[test]
    fn missing_required_tool_fails_before_any_fetch() {
        // REQUIRED_TOOLS always includes tools that won't exist in a bare
        // test sandbox (e.g. "gbp"), so this exercises the tool-check gate
        // without needing network or git fixtures beyond it.
        let dir = tempfile::tempdir().unwrap();
        let git = NoopGit;
        let tarball = NoopTarball;
        let policy = AlwaysDenySnapshot;
        let upstream = sample_upstream();
        let run_context = FakeRunContext {
            dir: dir.path().to_path_buf(),
        };
        let mut sink = NullStateSink;
        let signature = NoopSignature;
        let mut collaborators = Collaborators {
            git: &git,
            tarball: &tarball,
            signature: &signature,
            snapshot_policy: &policy,
            upstream: &upstream,
            run_context: &run_context,
            state_sink: &mut sink,
        };
        let request = BuildRequest {
            package: "nova".to_string(),
            target: "dalmatian".to_string(),
            ubuntu_series: "noble".to_string(),
            cloud_archive: None,
            build_type: BuildType::Release,
            milestone_tag: None,
            binary: false,
            force: false,
            run_dir: dir.path().to_path_buf(),
        };
        let result = drive_single_package_build(&request, &mut collaborators);
        assert!(matches!(result, Err(PackastackError::ToolMissing { .. })));
    }
}
