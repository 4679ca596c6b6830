//! Package discovery: enumerate the set of source packages to plan a run
//! for, trying authorities in priority order and recording why any
//! candidate was excluded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use packastack_core::SourcePackageName;
use serde::{Deserialize, Serialize};
use tracing::instrument;

mod cache;
mod exclude;

pub use cache::{TeamRegistryClient, TeamRepoCache};
use exclude::is_excluded;

/// Where `DiscoveryResult.packages` ultimately came from.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    ExplicitList,
    PackagesFile,
    TeamRegistry,
    TeamRegistryCache,
    LocalCache,
}

/// Why a candidate repository was filtered out of the discovered set.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    KnownNonPackageRepo,
    CharmOrOperatorSuffix,
    HiddenDirectory,
    MissingDebianControl,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub packages: Vec<SourcePackageName>,
    pub filtered_repos: BTreeMap<String, FilterReason>,
    pub errors: Vec<String>,
    pub source: Option<DiscoverySource>,
}

/// Fixed list of known non-package repositories excluded regardless of
/// authority (spec §4.A).
const KNOWN_NON_PACKAGE_REPOS: &[&str] = &[
    "openstack",
    "governance",
    "releases",
    "project-config",
    "openstack-manuals",
];

/// Tries authorities in priority order: explicit list, packages file,
/// team registry (falling back to its cache), local packaging cache.
#[instrument(skip(explicit, cache_dir, packages_file, team_registry))]
pub fn discover(
    explicit: &[String],
    cache_dir: Option<&Path>,
    packages_file: Option<&Path>,
    offline: bool,
    team_registry: Option<&dyn TeamRegistryClient>,
) -> DiscoveryResult {
    if !explicit.is_empty() {
        tracing::info!(event = "discovery_authority", authority = "explicit_list", outcome = "found");
        return filter_candidates(explicit.iter().cloned(), DiscoverySource::ExplicitList);
    }

    if let Some(path) = packages_file {
        match read_packages_file(path) {
            Ok(names) if !names.is_empty() => {
                tracing::info!(event = "discovery_authority", authority = "packages_file", outcome = "found");
                return filter_candidates(names, DiscoverySource::PackagesFile);
            }
            Ok(_) => {
                tracing::info!(event = "discovery_authority", authority = "packages_file", outcome = "empty");
            }
            Err(err) => {
                tracing::warn!(event = "discovery_authority", authority = "packages_file", outcome = "error", reason = %err);
            }
        }
    }

    if !offline {
        if let (Some(dir), Some(client)) = (cache_dir, team_registry) {
            match TeamRepoCache::query(dir, client) {
                Ok(names) if !names.is_empty() => {
                    tracing::info!(event = "discovery_authority", authority = "team_registry", outcome = "found");
                    return filter_candidates(names, DiscoverySource::TeamRegistry);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(event = "discovery_authority", authority = "team_registry", outcome = "error", reason = %err);
                }
            }
            if let Ok(names) = TeamRepoCache::read_cache(dir) {
                if !names.is_empty() {
                    tracing::info!(event = "discovery_authority", authority = "team_registry_cache", outcome = "found");
                    return filter_candidates(names, DiscoverySource::TeamRegistryCache);
                }
            }
        }
    }

    if let Some(dir) = cache_dir {
        match scan_local_cache(dir) {
            Ok(names) if !names.is_empty() => {
                tracing::info!(event = "discovery_authority", authority = "local_cache", outcome = "found");
                let mut result = filter_candidates(names, DiscoverySource::LocalCache);
                validate_against_local_cache(&mut result, dir);
                return result;
            }
            Ok(_) => {}
            Err(err) => {
                return DiscoveryResult {
                    packages: Vec::new(),
                    filtered_repos: BTreeMap::new(),
                    errors: vec![err.to_string()],
                    source: None,
                };
            }
        }
    }

    DiscoveryResult {
        packages: Vec::new(),
        filtered_repos: BTreeMap::new(),
        errors: vec!["no discovery authority produced any packages".to_string()],
        source: None,
    }
}

fn read_packages_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read packages file {path:?}"))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn scan_local_cache(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list local packaging cache {dir:?}"))?;
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// Deduplicates by first occurrence and applies the exclusion rules,
/// validating against `debian/control` presence only for `LocalCache`
/// sourced candidates (other authorities name packages without a local
/// checkout to validate against).
fn filter_candidates(
    names: impl IntoIterator<Item = String>,
    source: DiscoverySource,
) -> DiscoveryResult {
    let mut seen = std::collections::BTreeSet::new();
    let mut packages = Vec::new();
    let mut filtered_repos = BTreeMap::new();

    for name in names {
        if !seen.insert(name.clone()) {
            continue;
        }
        if let Some(reason) = is_excluded(&name, KNOWN_NON_PACKAGE_REPOS) {
            filtered_repos.insert(name, reason);
            continue;
        }
        packages.push(SourcePackageName::new(name));
    }

    DiscoveryResult {
        packages,
        filtered_repos,
        errors: Vec::new(),
        source: Some(source),
    }
}

/// Validates local-cache candidates against `debian/control` presence,
/// applied after [`filter_candidates`] when `cache_dir` is available.
pub fn validate_against_local_cache(
    result: &mut DiscoveryResult,
    cache_dir: &Path,
) {
    let mut survivors = Vec::new();
    for package in std::mem::take(&mut result.packages) {
        let control_path: PathBuf = cache_dir.join(package.as_str()).join("debian/control");
        if control_path.is_file() {
            survivors.push(package);
        } else {
            result
                .filtered_repos
                .insert(package.to_string(), FilterReason::MissingDebianControl);
        }
    }
    result.packages = survivors;
}

/// Cross-reference outcome for one candidate deliverable/package pair
/// (spec §4.A "Cross-reference").
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossReferenceFlag {
    MissingUpstream,
    MissingPackaging,
}

/// Marks packages with no release-metadata entry and no upstream-registry
/// entry as `missing-upstream`, and deliverables with no corresponding
/// discovered package as `missing-packaging`.
pub fn cross_reference(
    discovered: &[SourcePackageName],
    in_release_metadata: impl Fn(&str) -> bool,
    has_upstream_entry: impl Fn(&str) -> bool,
    deliverables: &[String],
) -> BTreeMap<String, CrossReferenceFlag> {
    let mut flags = BTreeMap::new();

    for package in discovered {
        let common_name = package.strip_python_prefix();
        if !in_release_metadata(common_name) && !has_upstream_entry(common_name) {
            flags.insert(package.to_string(), CrossReferenceFlag::MissingUpstream);
        }
    }

    let discovered_common_names: std::collections::BTreeSet<&str> = discovered
        .iter()
        .map(|p| p.strip_python_prefix())
        .collect();
    for deliverable in deliverables {
        if !discovered_common_names.contains(deliverable.as_str()) {
            flags.insert(deliverable.clone(), CrossReferenceFlag::MissingPackaging);
        }
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_by_first_occurrence() {
        let result = filter_candidates(
            ["nova".to_string(), "nova".to_string(), "glance".to_string()],
            DiscoverySource::ExplicitList,
        );
        assert_eq!(result.packages.len(), 2);
    }

    #[test]
    fn excludes_known_non_package_repos_and_charm_suffix() {
        let result = filter_candidates(
            [
                "governance".to_string(),
                "nova-charm".to_string(),
                ".hidden".to_string(),
                "nova".to_string(),
            ],
            DiscoverySource::ExplicitList,
        );
        assert_eq!(result.packages.len(), 1);
        assert_eq!(result.filtered_repos.len(), 3);
    }

    #[test]
    fn discover_excludes_local_cache_entries_missing_debian_control() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nova/debian")).unwrap();
        std::fs::write(dir.path().join("nova/debian/control"), "").unwrap();
        std::fs::create_dir_all(dir.path().join("glance")).unwrap();

        let result = discover(&[], Some(dir.path()), None, true, None);

        assert_eq!(result.source, Some(DiscoverySource::LocalCache));
        assert_eq!(result.packages, vec![SourcePackageName::new("nova")]);
        assert_eq!(
            result.filtered_repos.get("glance"),
            Some(&FilterReason::MissingDebianControl)
        );
    }

    #[test]
    fn reads_packages_file_ignoring_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("packages.txt");
        std::fs::write(&path, "nova\n# comment\n\nglance\n").unwrap();
        let names = read_packages_file(&path).unwrap();
        assert_eq!(names, vec!["nova".to_string(), "glance".to_string()]);
    }

    #[test]
    fn cross_reference_flags_missing_upstream_and_packaging() {
        let discovered = vec![SourcePackageName::new("nova")];
        let flags = cross_reference(
            &discovered,
            |_name| false,
            |_name| false,
            &["nova".to_string(), "glance".to_string()],
        );
        assert_eq!(
            flags.get("nova"),
            Some(&CrossReferenceFlag::MissingUpstream)
        );
        assert_eq!(
            flags.get("glance"),
            Some(&CrossReferenceFlag::MissingPackaging)
        );
    }
}
