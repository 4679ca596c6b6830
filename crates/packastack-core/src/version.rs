//! Debian version parsing and the snapshot/milestone/release version
//! grammars used to compute the next `debian/changelog` entry.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static DEBIAN_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:([0-9]+):)?([^:-]+?)(?:-([^-]+))?$").unwrap());

/// The snapshot grammar checked by the test suite:
/// `{base}+git{YYYYMMDD}.{commit_count}.{sha7}`.
static SNAPSHOT_UPSTREAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.+\+git[0-9]{8}\.[0-9]+\.[0-9a-f]{7}$").unwrap());

/// A parsed Debian package version: `[epoch:]upstream[-revision]`.
///
/// Round-trips exactly: `Display::to_string` of a parsed version always
/// equals the original input.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DebianVersion {
    epoch: Option<u32>,
    upstream: String,
    revision: Option<String>,
}

impl DebianVersion {
    pub fn new(epoch: Option<u32>, upstream: impl Into<String>, revision: Option<String>) -> Self {
        Self {
            epoch,
            upstream: upstream.into(),
            revision,
        }
    }

    pub fn epoch(&self) -> Option<u32> {
        self.epoch
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Parses `debian/changelog`'s first entry version string.
    pub fn parse(text: &str) -> Result<Self> {
        let caps = DEBIAN_VERSION_RE
            .captures(text)
            .ok_or_else(|| anyhow!("not a valid debian version: {text:?}"))?;
        let epoch = caps.get(1).map(|m| m.as_str().parse::<u32>()).transpose()?;
        let upstream = caps
            .get(2)
            .ok_or_else(|| anyhow!("missing upstream component in {text:?}"))?
            .as_str()
            .to_string();
        let revision = caps.get(3).map(|m| m.as_str().to_string());
        Ok(Self {
            epoch,
            upstream,
            revision,
        })
    }

    /// Returns a copy with the upstream and revision replaced, keeping the
    /// epoch, used when computing the next changelog entry.
    pub fn with_upstream_and_revision(
        &self,
        upstream: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            epoch: self.epoch,
            upstream: upstream.into(),
            revision: Some(revision.into()),
        }
    }
}

impl fmt::Display for DebianVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(epoch) = self.epoch {
            write!(f, "{epoch}:")?;
        }
        f.write_str(&self.upstream)?;
        if let Some(revision) = &self.revision {
            write!(f, "-{revision}")?;
        }
        Ok(())
    }
}

impl FromStr for DebianVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Builds the upstream version component for a `snapshot` build-type
/// changelog entry: `{base}+git{YYYYMMDD}.{commit_count}.{sha7}`.
///
/// `base` is the git-describe base tag with any leading `v` stripped (or
/// `0.0.0` if the caller found no tags); `commit_date` is `YYYYMMDD`;
/// `sha7` must be exactly 7 hex characters.
pub fn snapshot_upstream_version(
    base: &str,
    commit_date_yyyymmdd: &str,
    commit_count: u32,
    sha7: &str,
) -> Result<String> {
    if sha7.len() != 7 || !sha7.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!("sha must be exactly 7 hex characters, got {sha7:?}"));
    }
    if commit_date_yyyymmdd.len() != 8 || !commit_date_yyyymmdd.chars().all(|c| c.is_ascii_digit())
    {
        return Err(anyhow!(
            "commit date must be YYYYMMDD, got {commit_date_yyyymmdd:?}"
        ));
    }
    let base = base.strip_prefix('v').unwrap_or(base);
    let version = format!("{base}+git{commit_date_yyyymmdd}.{commit_count}.{sha7}");
    debug_assert!(SNAPSHOT_UPSTREAM_RE.is_match(&version));
    Ok(version)
}

/// Returns `true` when `upstream` matches the snapshot grammar.
pub fn is_snapshot_upstream(upstream: &str) -> bool {
    SNAPSHOT_UPSTREAM_RE.is_match(upstream)
}

/// The three changelog-entry shapes a build type can produce (spec §4.I
/// step 9):
///
/// - release:   `{epoch}:{new_upstream}-0ubuntu1`
/// - milestone: `{epoch}:{new_upstream}~{milestone}-0ubuntu1`
/// - snapshot:  `{epoch}:{base_upstream}+git{YYYYMMDD}.{count}.{sha7}-0ubuntu1`
pub fn next_changelog_version(
    current: &DebianVersion,
    new_upstream_for_release: Option<&str>,
    milestone: Option<&str>,
    snapshot_upstream: Option<&str>,
) -> Result<DebianVersion> {
    let upstream = match (new_upstream_for_release, milestone, snapshot_upstream) {
        (_, _, Some(snapshot)) => snapshot.to_string(),
        (Some(release), Some(milestone), None) => format!("{release}~{milestone}"),
        (Some(release), None, None) => release.to_string(),
        _ => return Err(anyhow!("next_changelog_version: no upstream source given")),
    };
    Ok(current.with_upstream_and_revision(upstream, "0ubuntu1"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_epoch_upstream_revision() {
        for input in ["2:1.2.3-0ubuntu1", "1.2.3-0ubuntu1", "2:1.2.3"] {
            let parsed = DebianVersion::parse(input).unwrap();
            assert_eq!(parsed.to_string(), input);
        }
    }

    #[test]
    fn snapshot_grammar_matches_regex() {
        let version =
            snapshot_upstream_version("30.0.0", "20241227", 50, "abc1234").unwrap();
        assert_eq!(version, "30.0.0+git20241227.50.abc1234");
        assert!(is_snapshot_upstream(&version));
    }

    #[test]
    fn snapshot_grammar_strips_leading_v() {
        let version = snapshot_upstream_version("v30.0.0", "20241227", 0, "abc1234").unwrap();
        assert_eq!(version, "30.0.0+git20241227.0.abc1234");
    }

    #[test]
    fn rejects_malformed_sha() {
        assert!(snapshot_upstream_version("1.0.0", "20241227", 0, "abc123").is_err());
        assert!(snapshot_upstream_version("1.0.0", "20241227", 0, "ABCDEFG").is_err());
    }

    #[test]
    fn builds_milestone_entry() {
        let current = DebianVersion::parse("2:25.0.0-0ubuntu1").unwrap();
        let next =
            next_changelog_version(&current, Some("26.0.0"), Some("b1"), None).unwrap();
        assert_eq!(next.to_string(), "2:26.0.0~b1-0ubuntu1");
    }

    #[test]
    fn builds_snapshot_entry() {
        let current = DebianVersion::parse("2:25.0.0-0ubuntu1").unwrap();
        let snap = snapshot_upstream_version("30.0.0", "20241227", 50, "abc1234").unwrap();
        let next = next_changelog_version(&current, None, None, Some(&snap)).unwrap();
        assert_eq!(next.to_string(), "2:30.0.0+git20241227.50.abc1234-0ubuntu1");
    }
}
