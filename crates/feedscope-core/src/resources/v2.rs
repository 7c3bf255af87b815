//! Legacy v2 (OData) feeds.
//!
//! Feed payloads are parsed by an externally supplied [`ODataFeedParser`];
//! without one, the v2 providers never apply.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::capability::{
    DependencyInfoCapability, DependencyInfoResource, FindPackageByIdCapability,
    FindPackageByIdResource, HttpSourceCapability,
};
use super::http::HttpSource;
use crate::error::ResourceError;
use crate::registry::{ProviderDescriptor, ResourceProvider, SourceRepository};
use crate::source::FeedType;
use crate::types::{
    DependencyGroup, FindPackageByIdDependencyInfo, Framework, PackageIdentity,
    SourcePackageDependencyInfo, select_dependencies,
};

/// One package entry of a v2 feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V2FeedPackage {
    pub identity: PackageIdentity,
    pub dependency_groups: Vec<DependencyGroup>,
    pub listed: bool,
    pub download_url: Option<Url>,
}

/// One page of a v2 feed response.
#[derive(Debug, Clone, Default)]
pub struct V2FeedPage {
    pub entries: Vec<V2FeedPackage>,
    /// Continuation link, if the feed paged the result
    pub next: Option<Url>,
}

/// Parses v2 OData (Atom) payloads.
pub trait ODataFeedParser: Send + Sync {
    fn parse_page(&self, payload: &[u8]) -> anyhow::Result<V2FeedPage>;
}

/// Queries a v2 feed through an [`ODataFeedParser`].
pub struct V2FeedClient {
    http: Arc<HttpSource>,
    parser: Arc<dyn ODataFeedParser>,
}

impl V2FeedClient {
    pub fn new(http: Arc<HttpSource>, parser: Arc<dyn ODataFeedParser>) -> Self {
        Self { http, parser }
    }

    /// `{base}/FindPackagesById()?id='{id}'`
    pub fn find_packages_by_id_url(&self, id: &str) -> Result<Url, ResourceError> {
        let base = self.http.base_url();
        let mut dir = base.clone();
        if !dir.path().ends_with('/') {
            let path = format!("{}/", dir.path());
            dir.set_path(&path);
        }
        let mut url = dir
            .join("FindPackagesById()")
            .map_err(|e| ResourceError::invalid_payload(base.as_str(), e))?;
        url.query_pairs_mut().append_pair("id", &format!("'{id}'"));
        Ok(url)
    }

    /// Every entry for `id`, following continuation links.
    ///
    /// A continuation link pointing at an already fetched page is an
    /// invalid payload.
    pub async fn find_packages_by_id(
        &self,
        id: &str,
        token: &CancellationToken,
    ) -> Result<Vec<V2FeedPackage>, ResourceError> {
        let mut entries = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(self.find_packages_by_id_url(id)?);

        while let Some(url) = next.take() {
            let Some(body) = self.http.get_bytes(&url, token).await? else {
                break;
            };
            let page = self
                .parser
                .parse_page(&body)
                .map_err(|e| ResourceError::invalid_payload(url.as_str(), format!("{e:#}")))?;
            entries.extend(page.entries);
            visited.insert(url.clone());
            if let Some(link) = page.next {
                if visited.contains(&link) {
                    return Err(ResourceError::invalid_payload(
                        url.as_str(),
                        format!("continuation link loops back to {link}"),
                    ));
                }
                next = Some(link);
            }
        }

        entries.retain(|e| e.identity.matches_id(id));
        entries.sort_by(|a, b| a.identity.version.cmp(&b.identity.version));
        Ok(entries)
    }

    async fn find_package(
        &self,
        id: &str,
        version: &Version,
        token: &CancellationToken,
    ) -> Result<Option<V2FeedPackage>, ResourceError> {
        Ok(self
            .find_packages_by_id(id, token)
            .await?
            .into_iter()
            .find(|e| &e.identity.version == version))
    }
}

/// Package-by-id lookups against a v2 feed.
pub struct RemoteV2FindPackageById {
    client: V2FeedClient,
}

impl RemoteV2FindPackageById {
    pub fn new(client: V2FeedClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FindPackageByIdResource for RemoteV2FindPackageById {
    async fn get_all_versions(
        &self,
        id: &str,
        token: &CancellationToken,
    ) -> Result<Vec<Version>, ResourceError> {
        let entries = self.client.find_packages_by_id(id, token).await?;
        Ok(entries.into_iter().map(|e| e.identity.version).collect())
    }

    async fn get_dependency_info(
        &self,
        id: &str,
        version: &Version,
        token: &CancellationToken,
    ) -> Result<Option<FindPackageByIdDependencyInfo>, ResourceError> {
        Ok(self
            .client
            .find_package(id, version, token)
            .await?
            .map(|e| FindPackageByIdDependencyInfo {
                identity: e.identity,
                dependency_groups: e.dependency_groups,
            }))
    }

    async fn copy_package(
        &self,
        id: &str,
        version: &Version,
        token: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, ResourceError> {
        let download = self
            .client
            .find_package(id, version, token)
            .await?
            .and_then(|e| e.download_url);
        match download {
            Some(url) => self.client.http.get_bytes(&url, token).await,
            None => Ok(None),
        }
    }

    async fn get_original_identity(
        &self,
        id: &str,
        version: &Version,
        token: &CancellationToken,
    ) -> Result<Option<PackageIdentity>, ResourceError> {
        Ok(self
            .client
            .find_package(id, version, token)
            .await?
            .map(|e| e.identity))
    }
}

/// Dependency info read from v2 feed entries.
pub struct DependencyInfoV2Feed {
    client: V2FeedClient,
    source_name: String,
}

impl DependencyInfoV2Feed {
    pub fn new(client: V2FeedClient, source_name: impl Into<String>) -> Self {
        Self {
            client,
            source_name: source_name.into(),
        }
    }

    fn to_dependency_info(
        &self,
        entry: V2FeedPackage,
        framework: &Framework,
    ) -> SourcePackageDependencyInfo {
        SourcePackageDependencyInfo {
            dependencies: select_dependencies(&entry.dependency_groups, framework),
            identity: entry.identity,
            listed: entry.listed,
            source: self.source_name.clone(),
            download_uri: entry.download_url,
        }
    }
}

#[async_trait]
impl DependencyInfoResource for DependencyInfoV2Feed {
    async fn resolve_package(
        &self,
        identity: &PackageIdentity,
        framework: &Framework,
        token: &CancellationToken,
    ) -> Result<Option<SourcePackageDependencyInfo>, ResourceError> {
        Ok(self
            .client
            .find_package(&identity.id, &identity.version, token)
            .await?
            .map(|e| self.to_dependency_info(e, framework)))
    }

    async fn resolve_packages(
        &self,
        id: &str,
        framework: &Framework,
        token: &CancellationToken,
    ) -> Result<Vec<SourcePackageDependencyInfo>, ResourceError> {
        let entries = self.client.find_packages_by_id(id, token).await?;
        Ok(entries
            .into_iter()
            .map(|e| self.to_dependency_info(e, framework))
            .collect())
    }
}

pub struct RemoteV2FindPackageByIdProvider {
    descriptor: ProviderDescriptor,
    parser: Option<Arc<dyn ODataFeedParser>>,
}

impl RemoteV2FindPackageByIdProvider {
    pub fn new(parser: Option<Arc<dyn ODataFeedParser>>) -> Self {
        Self {
            descriptor: ProviderDescriptor::new::<FindPackageByIdCapability>(
                "RemoteV2FindPackageById",
            )
            .before("LocalV2FindPackageById")
            .requires::<HttpSourceCapability>(),
            parser,
        }
    }
}

#[async_trait]
impl ResourceProvider<FindPackageByIdCapability> for RemoteV2FindPackageByIdProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn try_create(
        &self,
        repository: &SourceRepository,
        token: &CancellationToken,
    ) -> Result<Option<Arc<dyn FindPackageByIdResource>>, ResourceError> {
        let Some(parser) = &self.parser else {
            return Ok(None);
        };
        if repository.feed_type(token).await? != FeedType::HttpV2 {
            return Ok(None);
        }
        let http = repository
            .get_resource::<HttpSourceCapability>(token)
            .await?;
        let client = V2FeedClient::new(http, Arc::clone(parser));
        Ok(Some(Arc::new(RemoteV2FindPackageById::new(client))))
    }
}

pub struct DependencyInfoV2FeedProvider {
    descriptor: ProviderDescriptor,
    parser: Option<Arc<dyn ODataFeedParser>>,
}

impl DependencyInfoV2FeedProvider {
    pub fn new(parser: Option<Arc<dyn ODataFeedParser>>) -> Self {
        Self {
            descriptor: ProviderDescriptor::new::<DependencyInfoCapability>("DependencyInfoV2Feed")
                .before("LocalDependencyInfo")
                .requires::<HttpSourceCapability>(),
            parser,
        }
    }
}

#[async_trait]
impl ResourceProvider<DependencyInfoCapability> for DependencyInfoV2FeedProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn try_create(
        &self,
        repository: &SourceRepository,
        token: &CancellationToken,
    ) -> Result<Option<Arc<dyn DependencyInfoResource>>, ResourceError> {
        let Some(parser) = &self.parser else {
            return Ok(None);
        };
        if repository.feed_type(token).await? != FeedType::HttpV2 {
            return Ok(None);
        }
        let http = repository
            .get_resource::<HttpSourceCapability>(token)
            .await?;
        let client = V2FeedClient::new(http, Arc::clone(parser));
        let source_name = repository.source().name();
        Ok(Some(Arc::new(DependencyInfoV2Feed::new(client, source_name))))
    }
}
