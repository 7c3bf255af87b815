//! Capability contracts and their marker types.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use tokio_util::sync::CancellationToken;

use super::http::HttpSource;
use super::proxy::{DependencyInfoProxy, FindLocalPackagesProxy, FindPackageByIdProxy};
use super::v3::ServiceIndexResource;
use crate::diagnostics::SourceDiagnostics;
use crate::error::ResourceError;
use crate::types::{
    FindPackageByIdDependencyInfo, Framework, LocalPackageInfo, PackageIdentity,
    SourcePackageDependencyInfo,
};

/// A typed capability a source may support.
///
/// Implemented by uninhabited marker types; the repository caches one
/// `Arc<Self::Resource>` per source and marker.
pub trait Capability: Send + Sync + 'static {
    type Resource: ?Sized + Send + Sync + 'static;

    /// Name used in diagnostics events and errors.
    const NAME: &'static str;

    /// Wrap a freshly constructed resource before it is cached.
    fn decorate(
        inner: Arc<Self::Resource>,
        _diagnostics: &Arc<SourceDiagnostics>,
    ) -> Arc<Self::Resource> {
        inner
    }
}

/// Dependency lookup for packages on a feed.
#[async_trait]
pub trait DependencyInfoResource: Send + Sync {
    /// Dependency info for one exact package, narrowed to `framework`.
    async fn resolve_package(
        &self,
        identity: &PackageIdentity,
        framework: &Framework,
        token: &CancellationToken,
    ) -> Result<Option<SourcePackageDependencyInfo>, ResourceError>;

    /// Dependency info for every version of `id`.
    async fn resolve_packages(
        &self,
        id: &str,
        framework: &Framework,
        token: &CancellationToken,
    ) -> Result<Vec<SourcePackageDependencyInfo>, ResourceError>;
}

/// Version listing and package download by id.
#[async_trait]
pub trait FindPackageByIdResource: Send + Sync {
    async fn get_all_versions(
        &self,
        id: &str,
        token: &CancellationToken,
    ) -> Result<Vec<Version>, ResourceError>;

    async fn get_dependency_info(
        &self,
        id: &str,
        version: &Version,
        token: &CancellationToken,
    ) -> Result<Option<FindPackageByIdDependencyInfo>, ResourceError>;

    /// Raw package archive bytes.
    async fn copy_package(
        &self,
        id: &str,
        version: &Version,
        token: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, ResourceError>;

    /// Identity with the casing the feed stores.
    async fn get_original_identity(
        &self,
        id: &str,
        version: &Version,
        token: &CancellationToken,
    ) -> Result<Option<PackageIdentity>, ResourceError>;
}

/// Enumeration of packages in a local folder feed.
#[async_trait]
pub trait FindLocalPackagesResource: Send + Sync {
    async fn find_packages_by_id(
        &self,
        id: &str,
        token: &CancellationToken,
    ) -> Result<Vec<LocalPackageInfo>, ResourceError>;

    async fn get_package(
        &self,
        identity: &PackageIdentity,
        token: &CancellationToken,
    ) -> Result<Option<LocalPackageInfo>, ResourceError>;

    async fn get_packages(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<LocalPackageInfo>, ResourceError>;
}

pub enum DependencyInfoCapability {}

impl Capability for DependencyInfoCapability {
    type Resource = dyn DependencyInfoResource;
    const NAME: &'static str = "DependencyInfoResource";

    fn decorate(
        inner: Arc<Self::Resource>,
        diagnostics: &Arc<SourceDiagnostics>,
    ) -> Arc<Self::Resource> {
        Arc::new(DependencyInfoProxy::new(inner, Arc::clone(diagnostics)))
    }
}

pub enum FindPackageByIdCapability {}

impl Capability for FindPackageByIdCapability {
    type Resource = dyn FindPackageByIdResource;
    const NAME: &'static str = "FindPackageByIdResource";

    fn decorate(
        inner: Arc<Self::Resource>,
        diagnostics: &Arc<SourceDiagnostics>,
    ) -> Arc<Self::Resource> {
        Arc::new(FindPackageByIdProxy::new(inner, Arc::clone(diagnostics)))
    }
}

pub enum FindLocalPackagesCapability {}

impl Capability for FindLocalPackagesCapability {
    type Resource = dyn FindLocalPackagesResource;
    const NAME: &'static str = "FindLocalPackagesResource";

    fn decorate(
        inner: Arc<Self::Resource>,
        diagnostics: &Arc<SourceDiagnostics>,
    ) -> Arc<Self::Resource> {
        Arc::new(FindLocalPackagesProxy::new(inner, Arc::clone(diagnostics)))
    }
}

/// HTTP transport for a feed. Instrumented by its own handler chain.
pub enum HttpSourceCapability {}

impl Capability for HttpSourceCapability {
    type Resource = HttpSource;
    const NAME: &'static str = "HttpSource";
}

/// v3 service index of an HTTP feed.
pub enum ServiceIndexCapability {}

impl Capability for ServiceIndexCapability {
    type Resource = ServiceIndexResource;
    const NAME: &'static str = "ServiceIndexResource";
}

/// Run `work` unless `token` fires first.
pub async fn cancellable<T, F>(token: &CancellationToken, work: F) -> Result<T, ResourceError>
where
    F: Future<Output = Result<T, ResourceError>>,
{
    if token.is_cancelled() {
        return Err(ResourceError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ResourceError::Cancelled),
        result = work => result,
    }
}
