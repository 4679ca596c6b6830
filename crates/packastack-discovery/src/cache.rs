use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Narrow interface for the fleet-management team's repository registry,
/// so discovery can be tested without a live network query (spec §9
/// "Duck-typed collaborators → interface abstractions").
pub trait TeamRegistryClient {
    fn list_repos(&self) -> Result<Vec<String>>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct CacheDocument {
    repos: Vec<String>,
}

/// JSON-backed cache of the team registry's last successful response,
/// read as a fallback when the live query fails or is skipped (`offline`).
pub struct TeamRepoCache;

impl TeamRepoCache {
    const CACHE_FILE: &'static str = "team-repos.json";

    pub fn query(dir: &Path, client: &dyn TeamRegistryClient) -> Result<Vec<String>> {
        let repos = client.list_repos().context("team registry live query failed")?;
        // A cache-write failure must not fail discovery (spec §4.A).
        if let Err(err) = Self::write_cache(dir, &repos) {
            tracing::warn!(event = "team_repo_cache_write", outcome = "error", reason = %err);
        }
        Ok(repos)
    }

    pub fn read_cache(dir: &Path) -> Result<Vec<String>> {
        let path = dir.join(Self::CACHE_FILE);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read team repo cache {path:?}"))?;
        let doc: CacheDocument = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse team repo cache {path:?}"))?;
        Ok(doc.repos)
    }

    fn write_cache(dir: &Path, repos: &[String]) -> Result<()> {
        let path = dir.join(Self::CACHE_FILE);
        let doc = CacheDocument {
            repos: repos.to_vec(),
        };
        let content = serde_json::to_string_pretty(&doc)?;
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write team repo cache {path:?}"))?;
        Ok(())
    }
}
