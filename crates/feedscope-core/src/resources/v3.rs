//! v3 feeds: service index and flat container.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use semver::Version;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::archive::read_manifest_from_bytes;
use super::capability::{
    DependencyInfoCapability, DependencyInfoResource, FindPackageByIdCapability,
    FindPackageByIdResource, HttpSourceCapability, ServiceIndexCapability,
};
use super::http::HttpSource;
use crate::error::ResourceError;
use crate::registry::{ProviderDescriptor, ResourceProvider, SourceRepository};
use crate::types::{
    FindPackageByIdDependencyInfo, Framework, PackageIdentity, PackageManifest,
    SourcePackageDependencyInfo,
};

/// Service index type of the flat container endpoint.
pub const PACKAGE_BASE_ADDRESS: &str = "PackageBaseAddress/3.0.0";

#[derive(Debug, Deserialize)]
struct ServiceIndexDocument {
    version: String,
    #[serde(default)]
    resources: Vec<ServiceIndexEntryDocument>,
}

#[derive(Debug, Deserialize)]
struct ServiceIndexEntryDocument {
    #[serde(rename = "@id")]
    id: Url,
    #[serde(rename = "@type")]
    kind: OneOrMany,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// One endpoint advertised by a service index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIndexEntry {
    pub url: Url,
    pub kind: String,
}

/// Parsed v3 service index.
#[derive(Debug, Clone)]
pub struct ServiceIndexResource {
    index_url: Url,
    entries: Vec<ServiceIndexEntry>,
}

impl ServiceIndexResource {
    /// Parse a service index document. Only major version 3 is accepted.
    pub fn from_json(index_url: Url, body: &[u8]) -> Result<Self, ResourceError> {
        let document: ServiceIndexDocument = serde_json::from_slice(body)
            .map_err(|e| ResourceError::invalid_payload(index_url.as_str(), e))?;
        if !document.version.starts_with("3.") {
            return Err(ResourceError::invalid_payload(
                index_url.as_str(),
                format!("unsupported service index version '{}'", document.version),
            ));
        }

        let entries = document
            .resources
            .into_iter()
            .flat_map(|entry| {
                let kinds = match entry.kind {
                    OneOrMany::One(kind) => vec![kind],
                    OneOrMany::Many(kinds) => kinds,
                };
                kinds.into_iter().map(move |kind| ServiceIndexEntry {
                    url: entry.id.clone(),
                    kind,
                })
            })
            .collect();

        Ok(Self { index_url, entries })
    }

    pub fn index_url(&self) -> &Url {
        &self.index_url
    }

    pub fn entries(&self) -> &[ServiceIndexEntry] {
        &self.entries
    }

    /// Endpoints of `kind`, in document order.
    pub fn endpoints(&self, kind: &str) -> Vec<Url> {
        self.entries
            .iter()
            .filter(|e| e.kind.eq_ignore_ascii_case(kind))
            .map(|e| e.url.clone())
            .collect()
    }
}

/// Fetches the service index of feeds whose address is a `.json` document.
pub struct ServiceIndexProvider {
    descriptor: ProviderDescriptor,
}

impl ServiceIndexProvider {
    pub fn new() -> Self {
        Self {
            descriptor: ProviderDescriptor::new::<ServiceIndexCapability>("ServiceIndexV3")
                .requires::<HttpSourceCapability>(),
        }
    }
}

impl Default for ServiceIndexProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceProvider<ServiceIndexCapability> for ServiceIndexProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn try_create(
        &self,
        repository: &SourceRepository,
        token: &CancellationToken,
    ) -> Result<Option<Arc<ServiceIndexResource>>, ResourceError> {
        let source = repository.source();
        let Some(url) = source.url().filter(|_| source.is_json_index()) else {
            return Ok(None);
        };
        let http = repository
            .get_resource::<HttpSourceCapability>(token)
            .await?;
        let body = http
            .get_bytes(url, token)
            .await?
            .ok_or_else(|| ResourceError::Status {
                url: url.to_string(),
                status: 404,
            })?;
        let index = ServiceIndexResource::from_json(url.clone(), &body)?;
        tracing::debug!(
            source = %source.name(),
            endpoints = index.entries().len(),
            "Loaded service index"
        );
        Ok(Some(Arc::new(index)))
    }
}

/// Append `path` to `base`, treating `base` as a directory.
fn child_url(base: &Url, path: &str) -> Result<Url, ResourceError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.join(path)
        .map_err(|e| ResourceError::invalid_payload(base.as_str(), e))
}

#[derive(Debug, Deserialize)]
struct VersionList {
    versions: Vec<String>,
}

/// Package-by-id lookups against a v3 flat container.
///
/// Manifests are cached per package once downloaded.
pub struct HttpFileSystemFindPackageById {
    base: Url,
    http: Arc<HttpSource>,
    manifests: Mutex<HashMap<(String, Version), PackageManifest>>,
}

impl HttpFileSystemFindPackageById {
    pub fn new(base: Url, http: Arc<HttpSource>) -> Self {
        Self {
            base,
            http,
            manifests: Mutex::new(HashMap::new()),
        }
    }

    /// `{base}/{id}/{version}/{id}.{version}.nupkg`, lowercased.
    pub fn package_url(&self, id: &str, version: &Version) -> Result<Url, ResourceError> {
        let id = id.to_ascii_lowercase();
        let version = version.to_string().to_ascii_lowercase();
        child_url(&self.base, &format!("{id}/{version}/{id}.{version}.nupkg"))
    }

    async fn manifest(
        &self,
        id: &str,
        version: &Version,
        token: &CancellationToken,
    ) -> Result<Option<PackageManifest>, ResourceError> {
        let key = (id.to_ascii_lowercase(), version.clone());
        if let Some(manifest) = self.manifests.lock().get(&key) {
            return Ok(Some(manifest.clone()));
        }
        let url = self.package_url(id, version)?;
        let Some(bytes) = self.http.get_bytes(&url, token).await? else {
            return Ok(None);
        };
        let manifest = read_manifest_from_bytes(url.as_str(), &bytes)?;
        self.manifests.lock().insert(key, manifest.clone());
        Ok(Some(manifest))
    }
}

#[async_trait]
impl FindPackageByIdResource for HttpFileSystemFindPackageById {
    async fn get_all_versions(
        &self,
        id: &str,
        token: &CancellationToken,
    ) -> Result<Vec<Version>, ResourceError> {
        let url = child_url(&self.base, &format!("{}/index.json", id.to_ascii_lowercase()))?;
        let Some(list) = self.http.get_json::<VersionList>(&url, token).await? else {
            return Ok(Vec::new());
        };
        let mut versions: Vec<Version> = list
            .versions
            .iter()
            .filter_map(|v| Version::parse(v).ok())
            .collect();
        versions.sort();
        Ok(versions)
    }

    async fn get_dependency_info(
        &self,
        id: &str,
        version: &Version,
        token: &CancellationToken,
    ) -> Result<Option<FindPackageByIdDependencyInfo>, ResourceError> {
        Ok(self
            .manifest(id, version, token)
            .await?
            .map(|m| FindPackageByIdDependencyInfo {
                identity: m.identity(),
                dependency_groups: m.dependency_groups,
            }))
    }

    async fn copy_package(
        &self,
        id: &str,
        version: &Version,
        token: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, ResourceError> {
        let url = self.package_url(id, version)?;
        self.http.get_bytes(&url, token).await
    }

    async fn get_original_identity(
        &self,
        id: &str,
        version: &Version,
        token: &CancellationToken,
    ) -> Result<Option<PackageIdentity>, ResourceError> {
        Ok(self
            .manifest(id, version, token)
            .await?
            .map(|m| m.identity()))
    }
}

/// Flat container resource for `repository`, if its index advertises one.
async fn flat_container(
    repository: &SourceRepository,
    token: &CancellationToken,
) -> Result<Option<HttpFileSystemFindPackageById>, ResourceError> {
    let Some(index) = repository
        .try_get_resource::<ServiceIndexCapability>(token)
        .await?
    else {
        return Ok(None);
    };
    let Some(base) = index.endpoints(PACKAGE_BASE_ADDRESS).into_iter().next() else {
        return Ok(None);
    };
    let http = repository
        .get_resource::<HttpSourceCapability>(token)
        .await?;
    Ok(Some(HttpFileSystemFindPackageById::new(base, http)))
}

pub struct HttpFileSystemFindPackageByIdProvider {
    descriptor: ProviderDescriptor,
}

impl HttpFileSystemFindPackageByIdProvider {
    pub fn new() -> Self {
        Self {
            descriptor: ProviderDescriptor::new::<FindPackageByIdCapability>(
                "HttpFileSystemFindPackageById",
            )
            .before("RemoteV2FindPackageById")
            .requires::<ServiceIndexCapability>()
            .requires::<HttpSourceCapability>(),
        }
    }
}

impl Default for HttpFileSystemFindPackageByIdProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceProvider<FindPackageByIdCapability> for HttpFileSystemFindPackageByIdProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn try_create(
        &self,
        repository: &SourceRepository,
        token: &CancellationToken,
    ) -> Result<Option<Arc<dyn FindPackageByIdResource>>, ResourceError> {
        Ok(flat_container(repository, token)
            .await?
            .map(|r| Arc::new(r) as Arc<dyn FindPackageByIdResource>))
    }
}

/// Dependency info read from the manifests of flat container packages.
pub struct DependencyInfoV3 {
    packages: HttpFileSystemFindPackageById,
    source_name: String,
}

impl DependencyInfoV3 {
    pub fn new(packages: HttpFileSystemFindPackageById, source_name: impl Into<String>) -> Self {
        Self {
            packages,
            source_name: source_name.into(),
        }
    }
}

#[async_trait]
impl DependencyInfoResource for DependencyInfoV3 {
    async fn resolve_package(
        &self,
        identity: &PackageIdentity,
        framework: &Framework,
        token: &CancellationToken,
    ) -> Result<Option<SourcePackageDependencyInfo>, ResourceError> {
        let Some(manifest) = self
            .packages
            .manifest(&identity.id, &identity.version, token)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(SourcePackageDependencyInfo {
            dependencies: manifest.dependencies_for(framework),
            download_uri: Some(self.packages.package_url(&identity.id, &identity.version)?),
            identity: manifest.identity(),
            listed: true,
            source: self.source_name.clone(),
        }))
    }

    async fn resolve_packages(
        &self,
        id: &str,
        framework: &Framework,
        token: &CancellationToken,
    ) -> Result<Vec<SourcePackageDependencyInfo>, ResourceError> {
        let mut infos = Vec::new();
        for version in self.packages.get_all_versions(id, token).await? {
            let identity = PackageIdentity::new(id, version);
            if let Some(info) = self.resolve_package(&identity, framework, token).await? {
                infos.push(info);
            }
        }
        Ok(infos)
    }
}

pub struct DependencyInfoV3Provider {
    descriptor: ProviderDescriptor,
}

impl DependencyInfoV3Provider {
    pub fn new() -> Self {
        Self {
            descriptor: ProviderDescriptor::new::<DependencyInfoCapability>("DependencyInfoV3")
                .before("DependencyInfoV2Feed")
                .requires::<ServiceIndexCapability>()
                .requires::<HttpSourceCapability>(),
        }
    }
}

impl Default for DependencyInfoV3Provider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceProvider<DependencyInfoCapability> for DependencyInfoV3Provider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn try_create(
        &self,
        repository: &SourceRepository,
        token: &CancellationToken,
    ) -> Result<Option<Arc<dyn DependencyInfoResource>>, ResourceError> {
        let source_name = repository.source().name().to_string();
        Ok(flat_container(repository, token).await?.map(|packages| {
            Arc::new(DependencyInfoV3::new(packages, source_name)) as Arc<dyn DependencyInfoResource>
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"{
        "version": "3.0.0",
        "resources": [
            {"@id": "https://feed.example/flat/", "@type": "PackageBaseAddress/3.0.0"},
            {"@id": "https://feed.example/query", "@type": ["SearchQueryService", "SearchQueryService/3.0.0-beta"]}
        ]
    }"#;

    fn index_url() -> Url {
        Url::parse("https://feed.example/v3/index.json").unwrap()
    }

    #[test]
    fn test_parse_service_index() {
        let index = ServiceIndexResource::from_json(index_url(), INDEX.as_bytes()).unwrap();
        assert_eq!(index.entries().len(), 3);
        assert_eq!(
            index.endpoints("packagebaseaddress/3.0.0"),
            vec![Url::parse("https://feed.example/flat/").unwrap()]
        );
        assert_eq!(index.endpoints("SearchQueryService").len(), 1);
        assert!(index.endpoints("RegistrationsBaseUrl").is_empty());
    }

    #[test]
    fn test_rejects_other_major_versions() {
        let err = ServiceIndexResource::from_json(index_url(), br#"{"version": "2.0.0"}"#)
            .unwrap_err();
        assert!(matches!(err, ResourceError::InvalidPayload { .. }));
    }

    #[test]
    fn test_child_url_adds_missing_slash() {
        let base = Url::parse("https://feed.example/flat").unwrap();
        assert_eq!(
            child_url(&base, "alpha/index.json").unwrap().as_str(),
            "https://feed.example/flat/alpha/index.json"
        );
    }
}
