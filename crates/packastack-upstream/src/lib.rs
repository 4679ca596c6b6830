//! Resolves a common name (source-package or upstream deliverable name) to
//! the upstream configuration that governs where and how it is fetched.

use std::collections::BTreeMap;

use packastack_core::{
    ReleaseSourceConfig, ReleaseSourceType, SignatureMode, SignaturesConfig, TarballConfig,
    UpstreamConfig,
};
use serde::{Deserialize, Serialize};

/// One registry entry: the canonical project config plus its aliases.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub url: String,
    pub default_branch: String,
    pub deliverable: String,
    #[serde(default)]
    pub release_source: Option<ReleaseSourceType>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// In-memory, JSON-deserializable registry of explicit upstream overrides.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpstreamsRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

/// The resolved upstream project configuration for one name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolvedUpstream {
    pub config: UpstreamConfig,
    pub release_source: ReleaseSourceConfig,
    pub deliverable: String,
    /// Whether this came from an explicit registry entry rather than the
    /// deterministic fallback default.
    pub explicit: bool,
}

impl UpstreamsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: BTreeMap<String, RegistryEntry>) -> Self {
        Self { entries }
    }

    pub fn load_from_json(content: &str) -> anyhow::Result<Self> {
        let entries: BTreeMap<String, RegistryEntry> = serde_json::from_str(content)?;
        Ok(Self { entries })
    }

    /// Resolution order (spec §4.B): the input verbatim, then with a
    /// `python-`/`python3-` prefix stripped, then registered aliases.
    pub fn resolve(&self, name: &str) -> ResolvedUpstream {
        if let Some(entry) = self.entries.get(name) {
            return resolved_from_entry(entry, true);
        }

        let stripped = strip_python_prefix(name);
        if stripped != name {
            if let Some(entry) = self.entries.get(stripped) {
                return resolved_from_entry(entry, true);
            }
        }

        for entry in self.entries.values() {
            if entry.aliases.iter().any(|alias| alias == name || alias == stripped) {
                return resolved_from_entry(entry, true);
            }
        }

        tracing::warn!(
            event = "upstream_resolution_fallback",
            package = name,
            reason = "no explicit registry entry"
        );
        fallback_default(name)
    }

    /// Used by discovery's cross-reference step (spec §4.A).
    pub fn has_explicit_entry(&self, name: &str) -> bool {
        let stripped = strip_python_prefix(name);
        self.entries.contains_key(name)
            || self.entries.contains_key(stripped)
            || self
                .entries
                .values()
                .any(|entry| entry.aliases.iter().any(|a| a == name || a == stripped))
    }
}

fn strip_python_prefix(name: &str) -> &str {
    name.strip_prefix("python3-")
        .or_else(|| name.strip_prefix("python-"))
        .unwrap_or(name)
}

fn resolved_from_entry(entry: &RegistryEntry, explicit: bool) -> ResolvedUpstream {
    ResolvedUpstream {
        config: UpstreamConfig::default(),
        release_source: ReleaseSourceConfig {
            source_type: entry.release_source.unwrap_or(ReleaseSourceType::OpenstackReleases),
        },
        deliverable: entry.deliverable.clone(),
        explicit,
    }
}

/// Deterministic defaults when the registry has no entry (spec §4.B):
/// `https://opendev.org/openstack/{project}.git`, branch `master`,
/// release source `openstack-releases` with deliverable = project.
fn fallback_default(name: &str) -> ResolvedUpstream {
    let project = strip_python_prefix(name);
    ResolvedUpstream {
        config: UpstreamConfig {
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
        deliverable: project.to_string(),
        explicit: false,
    }
}

/// Builds the tarball filename stem for a project: hyphens replaced by
/// underscores in the filename only, never in the upstream path segment
/// (spec §6 "Tarball URL contract").
pub fn tarball_filename_stem(project: &str) -> String {
    project.replace('-', "_")
}

/// The canonical tarball URL for `project` at `version` (spec §6).
pub fn tarball_url(project: &str, version: &str) -> String {
    format!(
        "https://tarballs.opendev.org/openstack/{project}/{stem}-{version}.tar.gz",
        stem = tarball_filename_stem(project)
    )
}

/// The tarball's detached-signature URL: the tarball URL with `.asc`.
pub fn signature_url(project: &str, version: &str) -> String {
    format!("{}.asc", tarball_url(project, version))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_registry() -> UpstreamsRegistry {
        let mut entries = BTreeMap::new();
        entries.insert(
            "oslo.config".to_string(),
            RegistryEntry {
                url: "https://opendev.org/openstack/oslo.config.git".to_string(),
                default_branch: "master".to_string(),
                deliverable: "oslo.config".to_string(),
                release_source: Some(ReleaseSourceType::OpenstackReleases),
                aliases: vec!["python-oslo.config-alias".to_string()],
            },
        );
        UpstreamsRegistry::from_entries(entries)
    }

    #[test]
    fn resolves_verbatim_then_stripped_prefix_then_alias() {
        let registry = sample_registry();
        assert!(registry.resolve("oslo.config").explicit);
        assert!(registry.resolve("python-oslo.config").explicit);
        assert!(registry.resolve("python3-oslo.config").explicit);
        assert!(registry.resolve("python-oslo.config-alias").explicit);
    }

    #[test]
    fn falls_back_to_deterministic_default() {
        let registry = UpstreamsRegistry::new();
        let resolved = registry.resolve("python-barbican");
        assert!(!resolved.explicit);
        assert_eq!(resolved.deliverable, "barbican");
        assert_eq!(
            resolved.release_source.source_type,
            ReleaseSourceType::OpenstackReleases
        );
    }

    #[test]
    fn tarball_url_replaces_hyphens_only_in_filename() {
        let url = tarball_url("oslo-config", "9.1.0");
        assert_eq!(
            url,
            "https://tarballs.opendev.org/openstack/oslo-config/oslo_config-9.1.0.tar.gz"
        );
        assert_eq!(
            signature_url("oslo-config", "9.1.0"),
            "https://tarballs.opendev.org/openstack/oslo-config/oslo_config-9.1.0.tar.gz.asc"
        );
    }

    #[test]
    fn has_explicit_entry_matches_resolve_semantics() {
        let registry = sample_registry();
        assert!(registry.has_explicit_entry("python-oslo.config"));
        assert!(!registry.has_explicit_entry("nova"));
    }
}
