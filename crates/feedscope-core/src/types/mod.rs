//! Shared core types used across configuration, resources and diagnostics.

use std::fmt;
use std::path::PathBuf;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use url::Url;

/// Configuration scope levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigScope {
    /// User-wide configuration.
    Global,
    /// Per-project configuration (e.g., checked into version control).
    Project,
}

/// A package id paired with an exact version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageIdentity {
    pub id: String,
    pub version: Version,
}

impl PackageIdentity {
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }

    /// Package ids compare case-insensitively.
    pub fn matches_id(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id)
    }

    /// `{id}.{version}`, the stem used by package file and folder names.
    pub fn file_stem(&self) -> String {
        format!("{}.{}", self.id, self.version)
    }

    /// Parse a `{id}.{version}` stem such as `Newtonsoft.Json.13.0.1`.
    ///
    /// The id is the shortest dotted prefix whose remainder is a valid
    /// semantic version.
    pub fn parse_stem(stem: &str) -> Option<Self> {
        stem.match_indices('.').find_map(|(index, _)| {
            let (id, rest) = stem.split_at(index);
            let version = Version::parse(&rest[1..]).ok()?;
            (!id.is_empty()).then(|| Self::new(id, version))
        })
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

/// Target framework moniker, e.g. `net8.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Framework(String);

impl Framework {
    pub fn new(moniker: impl Into<String>) -> Self {
        Self(moniker.into())
    }

    /// Framework used when the caller has no preference.
    pub fn any() -> Self {
        Self("any".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A dependency on another package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDependency {
    pub id: String,
    #[serde(default = "any_version")]
    pub range: VersionReq,
}

fn any_version() -> VersionReq {
    VersionReq::STAR
}

/// Dependencies declared for one target framework (or for all of them).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGroup {
    #[serde(default)]
    pub framework: Option<Framework>,
    #[serde(default)]
    pub dependencies: Vec<PackageDependency>,
}

/// Package manifest carried inside every package archive as `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub id: String,
    pub version: Version,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub dependency_groups: Vec<DependencyGroup>,
}

impl PackageManifest {
    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(self.id.clone(), self.version.clone())
    }

    /// Dependencies that apply to `framework`.
    pub fn dependencies_for(&self, framework: &Framework) -> Vec<PackageDependency> {
        select_dependencies(&self.dependency_groups, framework)
    }
}

/// Pick the dependencies of `groups` that apply to `framework`: the exact
/// framework group, else the framework-agnostic one.
pub fn select_dependencies(
    groups: &[DependencyGroup],
    framework: &Framework,
) -> Vec<PackageDependency> {
    groups
        .iter()
        .find(|g| g.framework.as_ref() == Some(framework))
        .or_else(|| groups.iter().find(|g| g.framework.is_none()))
        .map(|g| g.dependencies.clone())
        .unwrap_or_default()
}

/// Dependency data exposed by package-by-id lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindPackageByIdDependencyInfo {
    pub identity: PackageIdentity,
    pub dependency_groups: Vec<DependencyGroup>,
}

/// Dependency data for one package, already narrowed to a framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePackageDependencyInfo {
    pub identity: PackageIdentity,
    pub dependencies: Vec<PackageDependency>,
    pub listed: bool,
    /// Name of the source that answered
    pub source: String,
    pub download_uri: Option<Url>,
}

/// A package found in a local folder feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPackageInfo {
    pub identity: PackageIdentity,
    /// Archive file, or the package folder for unzipped layouts
    pub path: PathBuf,
    pub manifest: PackageManifest,
}
