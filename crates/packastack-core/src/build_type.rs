//! Vocabulary shared by the build-type decision matrix (`packastack-buildtype`)
//! and everything downstream of it: the enums the matrix chooses between, and
//! the configuration/result structs that travel with a selection.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// The build type selected for a single package (spec §6 `build_type`).
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BuildType {
    Release,
    Milestone,
    Snapshot,
}

/// `build_type` as a user-facing request, with `Auto` letting the matrix
/// decide per package.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BuildTypeMode {
    Auto,
    Release,
    Milestone,
    Snapshot,
}

/// Where an OpenStack series sits relative to its final release.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    PreFinal,
    PostFinal,
    Unknown,
}

/// The kind of deliverable a project is, used by the matrix's
/// client/library snapshot-prevention rule.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliverableKind {
    Service,
    Library,
    Client,
    HorizonPlugin,
    TempestPlugin,
    Other,
    Unknown,
}

/// How confident the matrix is in a [`DeliverableKind`] classification.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum KindConfidence {
    Metadata,
    Heuristic,
    Default,
}

/// Why a particular [`BuildType`] was chosen; one row per matrix outcome.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    HasRelease,
    PostFinalRelease,
    CycleTrailingRelease,
    HasMilestoneOnly,
    IntermediaryRelease,
    NoReleaseYet,
    PreFinalNoRelease,
    NotInReleases,
    SnapshotForced,
    ClientLibraryNoSnapshot,
    RetiredProject,
    ReleaseModelUnknown,
    CycleStageUnknown,
}

/// Lifecycle status of a package relative to `openstack/releases`.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Active,
    New,
    Defunct,
    Retired,
    Unknown,
}

/// Which source is authoritative for a package's upstream version.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UpstreamAuthority {
    Releases,
    Watch,
    None,
}

/// `signature_mode` ∈ {auto, required, off} (spec §6).
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SignatureMode {
    Auto,
    Required,
    Off,
}

/// One entry of `tarball.prefer` (spec §6).
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TarballMethod {
    Official,
    Uscan,
    Pypi,
    GithubRelease,
    GitArchive,
}

/// `release_source.type` ∈ {openstack-releases, debian-watch, none}.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseSourceType {
    OpenstackReleases,
    DebianWatch,
    None,
}

/// Configuration for tarball acquisition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TarballConfig {
    pub prefer: Vec<TarballMethod>,
}

impl Default for TarballConfig {
    fn default() -> Self {
        Self {
            prefer: vec![
                TarballMethod::Official,
                TarballMethod::Uscan,
                TarballMethod::Pypi,
                TarballMethod::GithubRelease,
                TarballMethod::GitArchive,
            ],
        }
    }
}

/// Configuration for signature verification policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignaturesConfig {
    pub mode: SignatureMode,
}

impl Default for SignaturesConfig {
    fn default() -> Self {
        Self {
            mode: SignatureMode::Auto,
        }
    }
}

/// Configuration for which source is authoritative for upstream versions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReleaseSourceConfig {
    pub source_type: ReleaseSourceType,
}

impl Default for ReleaseSourceConfig {
    fn default() -> Self {
        Self {
            source_type: ReleaseSourceType::OpenstackReleases,
        }
    }
}

/// Top-level enumerated configuration for upstream resolution.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub tarball: TarballConfig,
    pub signatures: SignaturesConfig,
    pub release_source: ReleaseSourceConfig,
}

/// Controls `debian/watch` processing and `uscan` execution during planning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Master switch for watch processing. Disabled by `--offline`.
    pub enabled: bool,
    /// Use watch/uscan for packages not in `openstack/releases`.
    pub fallback_for_not_in_releases: bool,
    /// Run uscan to discover upstream versions.
    pub check_upstream: bool,
    /// Timeout for each uscan execution.
    pub timeout_seconds: u32,
    /// Maximum projects to run uscan for (0 = unlimited).
    pub max_projects: u32,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fallback_for_not_in_releases: true,
            check_upstream: true,
            timeout_seconds: 30,
            max_projects: 0,
        }
    }
}

/// Result of parsing `debian/watch` and (optionally) running `uscan`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WatchInfo {
    pub parsed: bool,
    pub mode: String,
    pub uscan_attempted: bool,
    pub uscan_status: String,
    pub uscan_error: String,
    pub packaged_version: String,
    pub upstream_version: String,
    pub newer_available: bool,
}

/// How a package's upstream version was resolved: `openstack/releases`
/// versus `debian/watch`, and the outcome.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpstreamResolution {
    pub authority: Option<UpstreamAuthority>,
    pub watch_used: bool,
    pub uscan_used: bool,
    pub reason: String,
    pub upstream_version: String,
    pub download_url: String,
}

/// Whether and why a project has been retired upstream, used to force the
/// matrix's retirement override.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetirementInfo {
    pub retired: bool,
    /// Set when retirement couldn't be confirmed but is suspected (e.g. the
    /// project's governance entry disappeared without an explicit EOL tag).
    pub possibly_retired: bool,
    pub reason: String,
}

impl RetirementInfo {
    pub fn active() -> Self {
        Self {
            retired: false,
            possibly_retired: false,
            reason: String::new(),
        }
    }
}
