//! Local folder feeds.
//!
//! Supported layouts:
//! - v2: `{id}.{version}.nupkg` in the root
//! - v3: `{id}/{version}/{id}.{version}.nupkg`
//! - packages.config: `{id}.{version}/{id}.{version}.nupkg`
//! - unzipped: `{id}.{version}/manifest.json`
//!
//! Unreadable packages are skipped with a warning so one corrupt archive
//! does not hide the rest of the feed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::archive::{
    MANIFEST_FILE, is_package_file, read_manifest_from_file, read_manifest_json,
};
use super::capability::{
    DependencyInfoCapability, DependencyInfoResource, FindLocalPackagesCapability,
    FindLocalPackagesResource, FindPackageByIdCapability, FindPackageByIdResource, cancellable,
};
use crate::error::ResourceError;
use crate::registry::{ProviderDescriptor, ResourceProvider, SourceRepository};
use crate::source::FeedType;
use crate::types::{
    FindPackageByIdDependencyInfo, Framework, LocalPackageInfo, PackageIdentity,
    SourcePackageDependencyInfo,
};

/// Sorted entries of `dir`. A missing directory has no entries.
pub(crate) fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, ResourceError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ResourceError::io(dir, e)),
    };
    let mut paths = entries
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ResourceError::io(dir, e))?;
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Folder layout of a local feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalLayout {
    V2,
    V3,
    PackagesConfig,
    Unzipped,
}

/// A package located by its path, before its manifest is read.
#[derive(Debug)]
struct Candidate {
    identity: PackageIdentity,
    path: PathBuf,
    extracted: bool,
}

/// A local folder read with a fixed layout.
#[derive(Debug, Clone)]
pub struct LocalPackageFolder {
    root: PathBuf,
    layout: LocalLayout,
}

impl LocalPackageFolder {
    pub fn new(root: impl Into<PathBuf>, layout: LocalLayout) -> Self {
        Self {
            root: root.into(),
            layout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> LocalLayout {
        self.layout
    }

    /// Every readable package, ordered by id then version.
    pub fn packages(&self) -> Result<Vec<LocalPackageInfo>, ResourceError> {
        self.load(self.candidates(None)?)
    }

    /// Every readable version of `id` (case-insensitive).
    pub fn packages_by_id(&self, id: &str) -> Result<Vec<LocalPackageInfo>, ResourceError> {
        self.load(self.candidates(Some(id))?)
    }

    pub fn package(
        &self,
        identity: &PackageIdentity,
    ) -> Result<Option<LocalPackageInfo>, ResourceError> {
        Ok(self
            .packages_by_id(&identity.id)?
            .into_iter()
            .find(|p| p.identity.version == identity.version))
    }

    fn candidates(&self, id: Option<&str>) -> Result<Vec<Candidate>, ResourceError> {
        let wanted = |identity: &PackageIdentity| id.is_none_or(|id| identity.matches_id(id));
        let mut found = Vec::new();

        match self.layout {
            LocalLayout::V2 => {
                for path in read_dir_sorted(&self.root)? {
                    if !path.is_file() || !is_package_file(&path) {
                        continue;
                    }
                    let identity = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .and_then(PackageIdentity::parse_stem);
                    if let Some(identity) = identity
                        && wanted(&identity)
                    {
                        found.push(Candidate {
                            identity,
                            path,
                            extracted: false,
                        });
                    }
                }
            }
            LocalLayout::V3 => {
                for id_dir in read_dir_sorted(&self.root)? {
                    let Some(dir_id) = file_name(&id_dir) else {
                        continue;
                    };
                    if !id_dir.is_dir() || id.is_some_and(|id| !id.eq_ignore_ascii_case(dir_id)) {
                        continue;
                    }
                    for version_dir in read_dir_sorted(&id_dir)? {
                        let Some(version) = file_name(&version_dir)
                            .and_then(|v| Version::parse(v).ok())
                        else {
                            continue;
                        };
                        let archive = read_dir_sorted(&version_dir)?
                            .into_iter()
                            .find(|p| p.is_file() && is_package_file(p));
                        if let Some(path) = archive {
                            found.push(Candidate {
                                identity: PackageIdentity::new(dir_id, version),
                                path,
                                extracted: false,
                            });
                        }
                    }
                }
            }
            LocalLayout::PackagesConfig | LocalLayout::Unzipped => {
                let extracted = self.layout == LocalLayout::Unzipped;
                for dir in read_dir_sorted(&self.root)? {
                    let Some(stem) = file_name(&dir) else {
                        continue;
                    };
                    let Some(identity) = PackageIdentity::parse_stem(stem) else {
                        continue;
                    };
                    if !dir.is_dir() || !wanted(&identity) {
                        continue;
                    }
                    let path = if extracted {
                        dir.clone()
                    } else {
                        dir.join(format!("{stem}.nupkg"))
                    };
                    let present = if extracted {
                        dir.join(MANIFEST_FILE).is_file()
                    } else {
                        path.is_file()
                    };
                    if present {
                        found.push(Candidate {
                            identity,
                            path,
                            extracted,
                        });
                    }
                }
            }
        }

        Ok(found)
    }

    fn load(&self, candidates: Vec<Candidate>) -> Result<Vec<LocalPackageInfo>, ResourceError> {
        let mut packages: Vec<LocalPackageInfo> = candidates
            .into_iter()
            .filter_map(|candidate| {
                let manifest = if candidate.extracted {
                    read_manifest_json(&candidate.path.join(MANIFEST_FILE))
                } else {
                    read_manifest_from_file(&candidate.path)
                };
                match manifest {
                    Ok(manifest) => Some(LocalPackageInfo {
                        identity: manifest.identity(),
                        path: candidate.path,
                        manifest,
                    }),
                    Err(e) => {
                        tracing::warn!(
                            package = %candidate.identity,
                            path = %candidate.path.display(),
                            error = %e,
                            "Skipping unreadable package"
                        );
                        None
                    }
                }
            })
            .collect();

        packages.sort_by(|a, b| {
            a.identity
                .id
                .to_ascii_lowercase()
                .cmp(&b.identity.id.to_ascii_lowercase())
                .then_with(|| a.identity.version.cmp(&b.identity.version))
        });
        Ok(packages)
    }
}

/// Run blocking folder work off the async runtime.
async fn blocking<T, F>(token: &CancellationToken, work: F) -> Result<T, ResourceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ResourceError> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(work);
    cancellable(token, async {
        task.await.map_err(|e| ResourceError::Task(e.to_string()))?
    })
    .await
}

/// Local package enumeration.
#[derive(Debug, Clone)]
pub struct LocalFindPackagesResource {
    folder: Arc<LocalPackageFolder>,
}

impl LocalFindPackagesResource {
    pub fn new(folder: LocalPackageFolder) -> Self {
        Self {
            folder: Arc::new(folder),
        }
    }
}

#[async_trait]
impl FindLocalPackagesResource for LocalFindPackagesResource {
    async fn find_packages_by_id(
        &self,
        id: &str,
        token: &CancellationToken,
    ) -> Result<Vec<LocalPackageInfo>, ResourceError> {
        let folder = Arc::clone(&self.folder);
        let id = id.to_string();
        blocking(token, move || folder.packages_by_id(&id)).await
    }

    async fn get_package(
        &self,
        identity: &PackageIdentity,
        token: &CancellationToken,
    ) -> Result<Option<LocalPackageInfo>, ResourceError> {
        let folder = Arc::clone(&self.folder);
        let identity = identity.clone();
        blocking(token, move || folder.package(&identity)).await
    }

    async fn get_packages(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<LocalPackageInfo>, ResourceError> {
        let folder = Arc::clone(&self.folder);
        blocking(token, move || folder.packages()).await
    }
}

/// Package-by-id lookups over a v2 or v3 folder.
#[derive(Debug, Clone)]
pub struct LocalFindPackageByIdResource {
    packages: LocalFindPackagesResource,
}

impl LocalFindPackageByIdResource {
    pub fn new(folder: LocalPackageFolder) -> Self {
        Self {
            packages: LocalFindPackagesResource::new(folder),
        }
    }

    async fn find(
        &self,
        id: &str,
        version: &Version,
        token: &CancellationToken,
    ) -> Result<Option<LocalPackageInfo>, ResourceError> {
        let identity = PackageIdentity::new(id, version.clone());
        self.packages.get_package(&identity, token).await
    }
}

#[async_trait]
impl FindPackageByIdResource for LocalFindPackageByIdResource {
    async fn get_all_versions(
        &self,
        id: &str,
        token: &CancellationToken,
    ) -> Result<Vec<Version>, ResourceError> {
        let packages = self.packages.find_packages_by_id(id, token).await?;
        Ok(packages.into_iter().map(|p| p.identity.version).collect())
    }

    async fn get_dependency_info(
        &self,
        id: &str,
        version: &Version,
        token: &CancellationToken,
    ) -> Result<Option<FindPackageByIdDependencyInfo>, ResourceError> {
        Ok(self
            .find(id, version, token)
            .await?
            .map(|p| FindPackageByIdDependencyInfo {
                identity: p.identity,
                dependency_groups: p.manifest.dependency_groups,
            }))
    }

    async fn copy_package(
        &self,
        id: &str,
        version: &Version,
        token: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, ResourceError> {
        let Some(package) = self.find(id, version, token).await? else {
            return Ok(None);
        };
        let path = package.path;
        cancellable(token, async move {
            tokio::fs::read(&path)
                .await
                .map(Some)
                .map_err(|e| ResourceError::io(&path, e))
        })
        .await
    }

    async fn get_original_identity(
        &self,
        id: &str,
        version: &Version,
        token: &CancellationToken,
    ) -> Result<Option<PackageIdentity>, ResourceError> {
        Ok(self.find(id, version, token).await?.map(|p| p.identity))
    }
}

/// Dependency info computed from local package manifests.
pub struct LocalDependencyInfoResource {
    packages: Arc<dyn FindLocalPackagesResource>,
    source_name: String,
}

impl LocalDependencyInfoResource {
    pub fn new(packages: Arc<dyn FindLocalPackagesResource>, source_name: impl Into<String>) -> Self {
        Self {
            packages,
            source_name: source_name.into(),
        }
    }

    fn to_dependency_info(
        &self,
        package: LocalPackageInfo,
        framework: &Framework,
    ) -> SourcePackageDependencyInfo {
        SourcePackageDependencyInfo {
            dependencies: package.manifest.dependencies_for(framework),
            identity: package.identity,
            listed: true,
            source: self.source_name.clone(),
            download_uri: Url::from_file_path(&package.path).ok(),
        }
    }
}

#[async_trait]
impl DependencyInfoResource for LocalDependencyInfoResource {
    async fn resolve_package(
        &self,
        identity: &PackageIdentity,
        framework: &Framework,
        token: &CancellationToken,
    ) -> Result<Option<SourcePackageDependencyInfo>, ResourceError> {
        let package = self.packages.get_package(identity, token).await?;
        Ok(package.map(|p| self.to_dependency_info(p, framework)))
    }

    async fn resolve_packages(
        &self,
        id: &str,
        framework: &Framework,
        token: &CancellationToken,
    ) -> Result<Vec<SourcePackageDependencyInfo>, ResourceError> {
        let packages = self.packages.find_packages_by_id(id, token).await?;
        Ok(packages
            .into_iter()
            .map(|p| self.to_dependency_info(p, framework))
            .collect())
    }
}

// Providers

/// Creates a [`LocalFindPackagesResource`] when the feed type matches.
pub struct LocalFindPackagesProvider {
    descriptor: ProviderDescriptor,
    layout: LocalLayout,
    feed_types: &'static [FeedType],
}

impl LocalFindPackagesProvider {
    pub fn v3() -> Self {
        Self {
            descriptor: ProviderDescriptor::new::<FindLocalPackagesCapability>(
                "FindLocalPackagesV3",
            )
            .before("FindLocalPackagesV2"),
            layout: LocalLayout::V3,
            feed_types: &[FeedType::LocalV3],
        }
    }

    pub fn v2() -> Self {
        Self {
            descriptor: ProviderDescriptor::new::<FindLocalPackagesCapability>(
                "FindLocalPackagesV2",
            )
            .before("FindLocalPackagesUnzipped"),
            layout: LocalLayout::V2,
            feed_types: &[FeedType::LocalV2, FeedType::LocalUnknown],
        }
    }

    pub fn unzipped() -> Self {
        Self {
            descriptor: ProviderDescriptor::new::<FindLocalPackagesCapability>(
                "FindLocalPackagesUnzipped",
            )
            .last(),
            layout: LocalLayout::Unzipped,
            feed_types: &[FeedType::LocalUnzipped],
        }
    }

    pub fn packages_config() -> Self {
        Self {
            descriptor: ProviderDescriptor::new::<FindLocalPackagesCapability>(
                "FindLocalPackagesPackagesConfig",
            )
            .last(),
            layout: LocalLayout::PackagesConfig,
            feed_types: &[FeedType::LocalPackagesConfig],
        }
    }
}

#[async_trait]
impl ResourceProvider<FindLocalPackagesCapability> for LocalFindPackagesProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn try_create(
        &self,
        repository: &SourceRepository,
        token: &CancellationToken,
    ) -> Result<Option<Arc<dyn FindLocalPackagesResource>>, ResourceError> {
        let Some(root) = repository.source().local_path() else {
            return Ok(None);
        };
        let feed_type = repository.feed_type(token).await?;
        if !self.feed_types.contains(&feed_type) {
            return Ok(None);
        }
        let folder = LocalPackageFolder::new(root, self.layout);
        Ok(Some(Arc::new(LocalFindPackagesResource::new(folder))))
    }
}

/// Creates a [`LocalFindPackageByIdResource`] for v2 or v3 folders.
pub struct LocalFindPackageByIdProvider {
    descriptor: ProviderDescriptor,
    layout: LocalLayout,
    feed_types: &'static [FeedType],
}

impl LocalFindPackageByIdProvider {
    pub fn v2() -> Self {
        Self {
            descriptor: ProviderDescriptor::new::<FindPackageByIdCapability>("LocalV2FindPackageById")
                .before("LocalV3FindPackageById"),
            layout: LocalLayout::V2,
            feed_types: &[FeedType::LocalV2],
        }
    }

    /// Also used for folders whose layout is not recognised yet.
    pub fn v3() -> Self {
        Self {
            descriptor: ProviderDescriptor::new::<FindPackageByIdCapability>("LocalV3FindPackageById"),
            layout: LocalLayout::V3,
            feed_types: &[FeedType::LocalV3, FeedType::LocalUnknown],
        }
    }
}

#[async_trait]
impl ResourceProvider<FindPackageByIdCapability> for LocalFindPackageByIdProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn try_create(
        &self,
        repository: &SourceRepository,
        token: &CancellationToken,
    ) -> Result<Option<Arc<dyn FindPackageByIdResource>>, ResourceError> {
        let Some(root) = repository.source().local_path() else {
            return Ok(None);
        };
        let feed_type = repository.feed_type(token).await?;
        if !self.feed_types.contains(&feed_type) {
            return Ok(None);
        }
        let folder = LocalPackageFolder::new(root, self.layout);
        Ok(Some(Arc::new(LocalFindPackageByIdResource::new(folder))))
    }
}

/// Dependency info for any source that can enumerate local packages.
pub struct LocalDependencyInfoProvider {
    descriptor: ProviderDescriptor,
}

impl LocalDependencyInfoProvider {
    pub fn new() -> Self {
        Self {
            descriptor: ProviderDescriptor::new::<DependencyInfoCapability>("LocalDependencyInfo")
                .last()
                .requires::<FindLocalPackagesCapability>(),
        }
    }
}

impl Default for LocalDependencyInfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceProvider<DependencyInfoCapability> for LocalDependencyInfoProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn try_create(
        &self,
        repository: &SourceRepository,
        token: &CancellationToken,
    ) -> Result<Option<Arc<dyn DependencyInfoResource>>, ResourceError> {
        let packages = repository
            .try_get_resource::<FindLocalPackagesCapability>(token)
            .await?;
        Ok(packages.map(|packages| {
            Arc::new(LocalDependencyInfoResource::new(
                packages,
                repository.source().name(),
            )) as Arc<dyn DependencyInfoResource>
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::archive::pack_manifest;
    use crate::types::{DependencyGroup, PackageDependency, PackageManifest};
    use semver::VersionReq;
    use std::fs;
    use tempfile::TempDir;

    fn manifest(id: &str, version: &str) -> PackageManifest {
        PackageManifest {
            id: id.into(),
            version: Version::parse(version).unwrap(),
            description: None,
            dependency_groups: vec![DependencyGroup {
                framework: None,
                dependencies: vec![PackageDependency {
                    id: "Common".into(),
                    range: VersionReq::parse(">=1.0.0").unwrap(),
                }],
            }],
        }
    }

    fn write_archive(path: &Path, id: &str, version: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, pack_manifest(&manifest(id, version)).unwrap()).unwrap();
    }

    #[test]
    fn test_v2_folder_listing() {
        let temp = TempDir::new().unwrap();
        write_archive(&temp.path().join("Beta.1.0.0.nupkg"), "Beta", "1.0.0");
        write_archive(&temp.path().join("Alpha.2.0.0.nupkg"), "Alpha", "2.0.0");
        write_archive(&temp.path().join("Alpha.1.0.0.nupkg"), "Alpha", "1.0.0");

        let folder = LocalPackageFolder::new(temp.path(), LocalLayout::V2);
        let all: Vec<_> = folder
            .packages()
            .unwrap()
            .into_iter()
            .map(|p| p.identity.to_string())
            .collect();
        assert_eq!(all, vec!["Alpha 1.0.0", "Alpha 2.0.0", "Beta 1.0.0"]);

        let alpha = folder.packages_by_id("alpha").unwrap();
        assert_eq!(alpha.len(), 2);
    }

    #[test]
    fn test_v3_folder_uses_manifest_casing() {
        let temp = TempDir::new().unwrap();
        write_archive(
            &temp.path().join("alpha/1.0.0/alpha.1.0.0.nupkg"),
            "Alpha",
            "1.0.0",
        );
        let folder = LocalPackageFolder::new(temp.path(), LocalLayout::V3);
        let found = folder
            .package(&PackageIdentity::new("ALPHA", Version::new(1, 0, 0)))
            .unwrap()
            .unwrap();
        assert_eq!(found.identity.id, "Alpha");
    }

    #[test]
    fn test_unzipped_and_packages_config() {
        let temp = TempDir::new().unwrap();
        let unzipped = temp.path().join("Alpha.1.0.0");
        fs::create_dir_all(&unzipped).unwrap();
        fs::write(
            unzipped.join(MANIFEST_FILE),
            serde_json::to_vec(&manifest("Alpha", "1.0.0")).unwrap(),
        )
        .unwrap();
        write_archive(
            &temp.path().join("Beta.2.0.0/Beta.2.0.0.nupkg"),
            "Beta",
            "2.0.0",
        );

        let unzipped = LocalPackageFolder::new(temp.path(), LocalLayout::Unzipped)
            .packages()
            .unwrap();
        assert_eq!(unzipped.len(), 1);
        assert_eq!(unzipped[0].identity.id, "Alpha");

        let config = LocalPackageFolder::new(temp.path(), LocalLayout::PackagesConfig)
            .packages()
            .unwrap();
        assert_eq!(config.len(), 1);
        assert_eq!(config[0].identity.id, "Beta");
    }

    #[test]
    fn test_corrupt_package_is_skipped() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("Broken.1.0.0.nupkg"), b"nope").unwrap();
        write_archive(&temp.path().join("Good.1.0.0.nupkg"), "Good", "1.0.0");
        let packages = LocalPackageFolder::new(temp.path(), LocalLayout::V2)
            .packages()
            .unwrap();
        assert_eq!(packages.len(), 1);
    }

    #[tokio::test]
    async fn test_find_package_by_id_resource() {
        let temp = TempDir::new().unwrap();
        write_archive(&temp.path().join("Alpha.1.0.0.nupkg"), "Alpha", "1.0.0");
        let resource =
            LocalFindPackageByIdResource::new(LocalPackageFolder::new(temp.path(), LocalLayout::V2));
        let token = CancellationToken::new();

        let versions = resource.get_all_versions("alpha", &token).await.unwrap();
        assert_eq!(versions, vec![Version::new(1, 0, 0)]);

        let bytes = resource
            .copy_package("alpha", &Version::new(1, 0, 0), &token)
            .await
            .unwrap()
            .unwrap();
        assert!(!bytes.is_empty());

        let missing = resource
            .get_dependency_info("alpha", &Version::new(9, 0, 0), &token)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_local_dependency_info() {
        let temp = TempDir::new().unwrap();
        write_archive(&temp.path().join("Alpha.1.0.0.nupkg"), "Alpha", "1.0.0");
        let packages = Arc::new(LocalFindPackagesResource::new(LocalPackageFolder::new(
            temp.path(),
            LocalLayout::V2,
        )));
        let resource = LocalDependencyInfoResource::new(packages, "offline");

        let infos = resource
            .resolve_packages("Alpha", &Framework::any(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].source, "offline");
        assert_eq!(infos[0].dependencies[0].id, "Common");
        assert!(infos[0].download_uri.is_some());
    }
}
