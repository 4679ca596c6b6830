use std::fmt;

use serde::{Deserialize, Serialize};

/// A Debian source-package name, e.g. `nova` or `python-oslo.config`.
///
/// Identity is the string name; within a single run the name set is fixed
/// after discovery (see §3 of the spec).
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourcePackageName(String);

impl SourcePackageName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Strips a `python-` or `python3-` prefix, used when matching binary
    /// dependency names against release-metadata deliverables.
    pub fn strip_python_prefix(&self) -> &str {
        self.0
            .strip_prefix("python3-")
            .or_else(|| self.0.strip_prefix("python-"))
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for SourcePackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourcePackageName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SourcePackageName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for SourcePackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An OpenStack upstream project key, e.g. `nova` or `oslo.config`. Distinct
/// from [`SourcePackageName`] because many source packages map to the same
/// upstream project key (`python-oslo.config` -> `oslo.config`).
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectKey(String);

impl ProjectKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ProjectKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// An Ubuntu series name (e.g. `noble`). Distinguished from the OpenStack
/// series (e.g. `dalmatian`) at the type level so the two can't be
/// accidentally swapped at a call site.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Series(String);

impl Series {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Series {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Series {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
