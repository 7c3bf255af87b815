//! Feed-type classification of package sources.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ResourceError;
use crate::registry::SourceRepository;
use crate::resources::archive::{MANIFEST_FILE, is_package_file};
use crate::resources::local::read_dir_sorted;
use crate::resources::{ServiceIndexCapability, cancellable};
use crate::types::PackageIdentity;

/// Protocol or folder layout of a source, used to pick applicable providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedType {
    /// `{id}.{version}.nupkg` files directly in the root
    LocalV2,
    /// `{id}/{version}/{id}.{version}.nupkg`
    LocalV3,
    /// `{id}.{version}/{id}.{version}.nupkg`
    LocalPackagesConfig,
    /// `{id}.{version}/manifest.json` with the package extracted
    LocalUnzipped,
    /// Missing, empty or unrecognised folder
    LocalUnknown,
    HttpV2,
    HttpV3,
    Unknown,
}

impl FeedType {
    pub fn is_local(self) -> bool {
        matches!(
            self,
            Self::LocalV2
                | Self::LocalV3
                | Self::LocalPackagesConfig
                | Self::LocalUnzipped
                | Self::LocalUnknown
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalV2 => "local-v2",
            Self::LocalV3 => "local-v3",
            Self::LocalPackagesConfig => "local-packages-config",
            Self::LocalUnzipped => "local-unzipped",
            Self::LocalUnknown => "local-unknown",
            Self::HttpV2 => "http-v2",
            Self::HttpV3 => "http-v3",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a source. Results are cached by the repository, so a probe
/// must be idempotent.
#[async_trait]
pub trait FeedTypeProbe: Send + Sync {
    async fn probe(
        &self,
        repository: &SourceRepository,
        token: &CancellationToken,
    ) -> Result<FeedType, ResourceError>;
}

/// Default probe: sniffs local folder layouts and asks HTTP feeds for a
/// v3 service index.
#[derive(Debug, Default, Clone, Copy)]
pub struct LayoutFeedTypeProbe;

#[async_trait]
impl FeedTypeProbe for LayoutFeedTypeProbe {
    async fn probe(
        &self,
        repository: &SourceRepository,
        token: &CancellationToken,
    ) -> Result<FeedType, ResourceError> {
        let source = repository.source();

        if let Some(root) = source.local_path() {
            let root = root.to_path_buf();
            let scan = tokio::task::spawn_blocking(move || detect_local_feed_type(&root));
            return cancellable(token, async {
                scan.await
                    .map_err(|e| ResourceError::Task(e.to_string()))?
            })
            .await;
        }

        if source.is_http() {
            let index = repository
                .try_get_resource::<ServiceIndexCapability>(token)
                .await?;
            return Ok(if index.is_some() {
                FeedType::HttpV3
            } else {
                FeedType::HttpV2
            });
        }

        Ok(FeedType::Unknown)
    }
}

/// Detect the layout of a local folder feed.
///
/// Checks run in order: loose archives in the root (v2), then
/// `{id}/{version}` folders (v3), then `{id}.{version}` folders holding
/// an archive (packages.config) or an extracted manifest (unzipped).
pub fn detect_local_feed_type(root: &Path) -> Result<FeedType, ResourceError> {
    if !root.is_dir() {
        return Ok(FeedType::LocalUnknown);
    }

    let entries = read_dir_sorted(root)?;

    if entries.iter().any(|p| p.is_file() && is_package_file(p)) {
        return Ok(FeedType::LocalV2);
    }

    let dirs: Vec<_> = entries.into_iter().filter(|p| p.is_dir()).collect();

    for dir in &dirs {
        if is_v3_id_folder(dir)? {
            return Ok(FeedType::LocalV3);
        }
    }

    for dir in &dirs {
        let Some(stem) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if PackageIdentity::parse_stem(stem).is_none() {
            continue;
        }
        if dir.join(format!("{stem}.nupkg")).is_file() {
            return Ok(FeedType::LocalPackagesConfig);
        }
        if dir.join(MANIFEST_FILE).is_file() {
            return Ok(FeedType::LocalUnzipped);
        }
    }

    Ok(FeedType::LocalUnknown)
}

fn is_v3_id_folder(dir: &Path) -> Result<bool, ResourceError> {
    for version_dir in read_dir_sorted(dir)? {
        let is_version = version_dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| Version::parse(n).is_ok());
        if !is_version || !version_dir.is_dir() {
            continue;
        }
        if read_dir_sorted(&version_dir)?
            .iter()
            .any(|p| p.is_file() && is_package_file(p))
        {
            return Ok(true);
        }
    }
    Ok(false)
}
