//! Signature policy (spec §4.I steps 6-7): GPG-verify an acquired tarball
//! per `SignatureMode`, and scrub embedded signing-key material from
//! `debian/upstream/` on snapshot builds.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use packastack_core::{SignatureMode, TarballMethod};

/// Fetches a detached GPG signature for a tarball, the signature-policy
/// analogue of [`crate::TarballFetcher`]. `Ok(None)` means no signature is
/// published for this project/version — only [`SignatureMode::Required`]
/// turns that into a failure; `Err` is a genuine fetch error (network,
/// transport) distinct from "not published".
pub trait SignatureFetcher {
    fn fetch_signature(
        &self,
        project: &str,
        version: &str,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>>;
}

/// What `verify_signature` actually did, for logging.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SignatureOutcome {
    /// `signature_mode: off`, or the tarball came from a method that
    /// doesn't publish a signature (only `official` does).
    Skipped,
    /// `signature_mode: auto` and no signature was published upstream.
    NotAvailable,
    /// A signature was fetched and `gpg --verify` accepted it.
    Verified,
}

/// Verifies `tarball_path` against its detached signature per `mode`
/// (spec §6 `signature_mode`). Only the `official` tarball method
/// publishes a signature upstream, so acquisitions via any other method
/// always skip verification.
pub fn verify_signature(
    fetcher: &dyn SignatureFetcher,
    mode: SignatureMode,
    method: TarballMethod,
    tarball_path: &Path,
    project: &str,
    version: &str,
    dest_dir: &Path,
) -> Result<SignatureOutcome> {
    if mode == SignatureMode::Off || method != TarballMethod::Official {
        return Ok(SignatureOutcome::Skipped);
    }

    let signature = fetcher
        .fetch_signature(project, version, dest_dir)
        .with_context(|| format!("fetching signature for {project} {version}"))?;

    match signature {
        None if mode == SignatureMode::Required => Err(anyhow::anyhow!(
            "signature_mode is required but no signature is published for {project} {version}"
        )),
        None => {
            tracing::warn!(
                event = "signature_unavailable",
                package = project,
                version = version,
            );
            Ok(SignatureOutcome::NotAvailable)
        }
        Some(sig_path) => {
            packastack_procutil::run_and_check(
                Command::new("gpg").arg("--verify").arg(&sig_path).arg(tarball_path),
            )
            .with_context(|| format!("gpg --verify failed for {project} {version}"))?;
            tracing::info!(event = "signature_verified", package = project, version = version);
            Ok(SignatureOutcome::Verified)
        }
    }
}

/// Removes signing-key material (`.asc`/`.gpg`/`.pgp` files) from
/// `debian/upstream/` for a snapshot build (spec §4.I step 7).
/// Release/milestone builds retain it, so this is only called for
/// `BuildType::Snapshot`. A missing `debian/upstream/` is not an error —
/// most packages don't carry one.
pub fn scrub_embedded_signing_keys(repo_path: &Path) -> Result<Vec<PathBuf>> {
    let upstream_dir = repo_path.join("debian").join("upstream");
    let mut removed = Vec::new();
    if !upstream_dir.is_dir() {
        return Ok(removed);
    }
    for entry in std::fs::read_dir(&upstream_dir)
        .with_context(|| format!("reading {}", upstream_dir.display()))?
    {
        let path = entry?.path();
        let is_key_material = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext, "asc" | "gpg" | "pgp"))
            .unwrap_or(false);
        if is_key_material {
            std::fs::remove_file(&path)
                .with_context(|| format!("removing {}", path.display()))?;
            removed.push(path);
        }
    }
    Ok(removed)
}

#[cfg(test)]
pub(crate) struct FixtureSignatureFetcher {
    pub signatures: std::collections::BTreeMap<(String, String), Vec<u8>>,
}

#[cfg(test)]
impl SignatureFetcher for FixtureSignatureFetcher {
    fn fetch_signature(
        &self,
        project: &str,
        version: &str,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        let key = (project.to_string(), version.to_string());
        let Some(bytes) = self.signatures.get(&key) else {
            return Ok(None);
        };
        let path = dest_dir.join(format!("{project}-{version}.tar.gz.asc"));
        std::fs::write(&path, bytes)?;
        Ok(Some(path))
    }
}
