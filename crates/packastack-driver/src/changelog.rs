//! Changelog version computation and entry creation (spec §4.I step 9).

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use packastack_core::version::{next_changelog_version, DebianVersion};
use packastack_core::BuildType;

/// The three changelog-entry shapes a build type can produce.
pub enum NextVersion<'a> {
    Release { new_upstream: &'a str },
    Milestone { new_upstream: &'a str, milestone: &'a str },
    Snapshot { upstream: &'a str },
}

/// Reads `debian/changelog`'s first entry (`dpkg-parsechangelog -S Version`
/// would also work; we parse directly since we already need
/// [`DebianVersion`] for the format).
pub fn read_current_version(changelog_path: &Path) -> Result<DebianVersion> {
    let output = Command::new("dpkg-parsechangelog")
        .arg("--show-field")
        .arg("Version")
        .arg("-l")
        .arg(changelog_path)
        .output()
        .context("running dpkg-parsechangelog")?;
    anyhow::ensure!(
        output.status.success(),
        "dpkg-parsechangelog failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let raw = String::from_utf8(output.stdout)?;
    DebianVersion::parse(raw.trim())
}

/// Computes the next version for `build_type` and writes a new
/// `debian/changelog` entry via `dch`.
pub fn write_changelog_entry(
    package_dir: &Path,
    build_type: BuildType,
    current: &DebianVersion,
    next: NextVersion<'_>,
    ubuntu_series: &str,
    reason: &str,
) -> Result<DebianVersion> {
    let next_version = match next {
        NextVersion::Release { new_upstream } => {
            next_changelog_version(current, Some(new_upstream), None, None)?
        }
        NextVersion::Milestone {
            new_upstream,
            milestone,
        } => next_changelog_version(current, Some(new_upstream), Some(milestone), None)?,
        NextVersion::Snapshot { upstream } => {
            next_changelog_version(current, None, None, Some(upstream))?
        }
    };

    let status = Command::new("dch")
        .current_dir(package_dir)
        .arg("--distribution")
        .arg(ubuntu_series)
        .arg("--newversion")
        .arg(next_version.to_string())
        .arg(format!("{build_type} build: {reason}"))
        .status()
        .context("running dch")?;
    anyhow::ensure!(status.success(), "dch failed with {status}");

    Ok(next_version)
}
