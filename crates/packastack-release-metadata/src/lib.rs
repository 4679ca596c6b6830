//! Read-only access to an on-disk `openstack/releases`-shaped metadata
//! tree: per-series deliverable YAML files plus series status.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use packastack_core::CycleStage;
use serde::{Deserialize, Serialize};

/// One entry of `deliverables/<series>/<project>.yaml`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectRelease {
    #[serde(default)]
    pub launchpad: Option<String>,
    #[serde(rename = "release-model", default)]
    pub release_model: String,
    #[serde(rename = "type", default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub releases: Vec<Release>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Release {
    pub version: String,
    #[serde(default)]
    pub projects: Vec<ReleaseProject>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseProject {
    pub repo: String,
    #[serde(default)]
    pub hash: Option<String>,
}

impl ProjectRelease {
    pub fn has_releases(&self) -> bool {
        !self.releases.is_empty()
    }

    pub fn has_beta_rc_or_final(&self) -> bool {
        self.releases
            .iter()
            .any(|r| version_is_beta(&r.version) || version_is_rc(&r.version) || version_is_final(&r.version))
    }

    pub fn get_latest_release(&self) -> Option<&Release> {
        self.releases.last()
    }

    pub fn get_latest_version(&self) -> Option<&str> {
        self.get_latest_release().map(|r| r.version.as_str())
    }
}

impl Release {
    pub fn is_beta(&self) -> bool {
        version_is_beta(&self.version)
    }

    pub fn is_rc(&self) -> bool {
        version_is_rc(&self.version)
    }

    pub fn is_final(&self) -> bool {
        version_is_final(&self.version)
    }
}

fn version_is_beta(version: &str) -> bool {
    version.contains('b') && !version.contains("rc")
}

fn version_is_rc(version: &str) -> bool {
    version.contains("rc")
}

fn version_is_final(version: &str) -> bool {
    !version_is_beta(version) && !version_is_rc(version)
}

#[derive(Clone, Debug, Deserialize)]
struct SeriesStatusFile {
    series: BTreeMap<String, SeriesStatusEntry>,
}

#[derive(Clone, Debug, Deserialize)]
struct SeriesStatusEntry {
    status: String,
}

/// Returns {development→pre-final; maintained|extended maintenance|
/// unmaintained→post-final; else unknown} for `series`, reading
/// `series_status.yaml` under `repo` (spec §4.C).
///
/// Never fails: an absent or unreadable repository degrades to
/// `CycleStage::Unknown`.
pub fn determine_cycle_stage(repo: Option<&Path>, series: &str) -> CycleStage {
    let Some(repo) = repo else {
        return CycleStage::Unknown;
    };
    let Some(status_map) = load_series_status(repo) else {
        return CycleStage::Unknown;
    };
    let Some(entry) = status_map.get(series) else {
        return CycleStage::Unknown;
    };
    match entry.status.as_str() {
        "development" => CycleStage::PreFinal,
        "maintained" | "extended maintenance" | "unmaintained" => CycleStage::PostFinal,
        _ => CycleStage::Unknown,
    }
}

fn load_series_status(repo: &Path) -> Option<BTreeMap<String, SeriesStatusEntry>> {
    let path = repo.join("data/series_status.yaml");
    let content = std::fs::read_to_string(path).ok()?;
    let parsed: SeriesStatusFile = serde_yaml::from_str(&content).ok()?;
    Some(parsed.series)
}

/// Loads `deliverables/<series>/<deliverable>.yaml`, or `None` when the
/// repo, series directory, or file is absent.
pub fn load_project_releases(
    repo: Option<&Path>,
    series: &str,
    deliverable: &str,
) -> Option<ProjectRelease> {
    let repo = repo?;
    let path = deliverable_path(repo, series, deliverable);
    let content = std::fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&content).ok()
}

/// Loads every deliverable file under `deliverables/<series>/` and maps
/// each of its `repo:` entries (stripped of the `openstack/` namespace) to
/// the deliverable name.
pub fn load_openstack_packages(
    repo: Option<&Path>,
    series: &str,
) -> BTreeMap<String, String> {
    let mut mapping = BTreeMap::new();
    let Some(repo) = repo else {
        return mapping;
    };
    let dir = repo.join("deliverables").join(series);
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return mapping;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        let Some(deliverable) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        let Ok(project) = serde_yaml::from_str::<ProjectRelease>(&content) else {
            continue;
        };
        for release in &project.releases {
            for release_project in &release.projects {
                let source_pkg = release_project
                    .repo
                    .rsplit('/')
                    .next()
                    .unwrap_or(&release_project.repo);
                mapping.insert(source_pkg.to_string(), deliverable.to_string());
            }
        }
    }
    mapping
}

fn deliverable_path(repo: &Path, series: &str, deliverable: &str) -> PathBuf {
    repo.join("deliverables")
        .join(series)
        .join(format!("{deliverable}.yaml"))
}

/// Returns the series directory name under `deliverables/` with no
/// terminal `series_status.yaml` entry other than `development`, i.e. the
/// series currently under active development.
pub fn get_current_development_series(repo: Option<&Path>) -> Option<String> {
    let repo = repo?;
    let status_map = load_series_status(repo)?;
    status_map
        .into_iter()
        .find(|(_, entry)| entry.status == "development")
        .map(|(series, _)| series)
}
