//! Diagnostics decorators for capability resources.
//!
//! Each proxy forwards every call to the wrapped resource through
//! [`SourceDiagnostics::trace_async`] and returns exactly what it returns.

use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use tokio_util::sync::CancellationToken;

use super::capability::{
    Capability, DependencyInfoCapability, DependencyInfoResource, FindLocalPackagesCapability,
    FindLocalPackagesResource, FindPackageByIdCapability, FindPackageByIdResource,
};
use crate::diagnostics::SourceDiagnostics;
use crate::error::ResourceError;
use crate::types::{
    FindPackageByIdDependencyInfo, Framework, LocalPackageInfo, PackageIdentity,
    SourcePackageDependencyInfo,
};

pub struct DependencyInfoProxy {
    inner: Arc<dyn DependencyInfoResource>,
    diagnostics: Arc<SourceDiagnostics>,
}

impl DependencyInfoProxy {
    pub fn new(inner: Arc<dyn DependencyInfoResource>, diagnostics: Arc<SourceDiagnostics>) -> Self {
        Self { inner, diagnostics }
    }
}

#[async_trait]
impl DependencyInfoResource for DependencyInfoProxy {
    async fn resolve_package(
        &self,
        identity: &PackageIdentity,
        framework: &Framework,
        token: &CancellationToken,
    ) -> Result<Option<SourcePackageDependencyInfo>, ResourceError> {
        self.diagnostics
            .trace_async(
                DependencyInfoCapability::NAME,
                "resolve_package",
                self.inner.resolve_package(identity, framework, token),
            )
            .await
    }

    async fn resolve_packages(
        &self,
        id: &str,
        framework: &Framework,
        token: &CancellationToken,
    ) -> Result<Vec<SourcePackageDependencyInfo>, ResourceError> {
        self.diagnostics
            .trace_async(
                DependencyInfoCapability::NAME,
                "resolve_packages",
                self.inner.resolve_packages(id, framework, token),
            )
            .await
    }
}

pub struct FindPackageByIdProxy {
    inner: Arc<dyn FindPackageByIdResource>,
    diagnostics: Arc<SourceDiagnostics>,
}

impl FindPackageByIdProxy {
    pub fn new(
        inner: Arc<dyn FindPackageByIdResource>,
        diagnostics: Arc<SourceDiagnostics>,
    ) -> Self {
        Self { inner, diagnostics }
    }
}

#[async_trait]
impl FindPackageByIdResource for FindPackageByIdProxy {
    async fn get_all_versions(
        &self,
        id: &str,
        token: &CancellationToken,
    ) -> Result<Vec<Version>, ResourceError> {
        self.diagnostics
            .trace_async(
                FindPackageByIdCapability::NAME,
                "get_all_versions",
                self.inner.get_all_versions(id, token),
            )
            .await
    }

    async fn get_dependency_info(
        &self,
        id: &str,
        version: &Version,
        token: &CancellationToken,
    ) -> Result<Option<FindPackageByIdDependencyInfo>, ResourceError> {
        self.diagnostics
            .trace_async(
                FindPackageByIdCapability::NAME,
                "get_dependency_info",
                self.inner.get_dependency_info(id, version, token),
            )
            .await
    }

    async fn copy_package(
        &self,
        id: &str,
        version: &Version,
        token: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, ResourceError> {
        self.diagnostics
            .trace_async(
                FindPackageByIdCapability::NAME,
                "copy_package",
                self.inner.copy_package(id, version, token),
            )
            .await
    }

    async fn get_original_identity(
        &self,
        id: &str,
        version: &Version,
        token: &CancellationToken,
    ) -> Result<Option<PackageIdentity>, ResourceError> {
        self.diagnostics
            .trace_async(
                FindPackageByIdCapability::NAME,
                "get_original_identity",
                self.inner.get_original_identity(id, version, token),
            )
            .await
    }
}

pub struct FindLocalPackagesProxy {
    inner: Arc<dyn FindLocalPackagesResource>,
    diagnostics: Arc<SourceDiagnostics>,
}

impl FindLocalPackagesProxy {
    pub fn new(
        inner: Arc<dyn FindLocalPackagesResource>,
        diagnostics: Arc<SourceDiagnostics>,
    ) -> Self {
        Self { inner, diagnostics }
    }
}

#[async_trait]
impl FindLocalPackagesResource for FindLocalPackagesProxy {
    async fn find_packages_by_id(
        &self,
        id: &str,
        token: &CancellationToken,
    ) -> Result<Vec<LocalPackageInfo>, ResourceError> {
        self.diagnostics
            .trace_async(
                FindLocalPackagesCapability::NAME,
                "find_packages_by_id",
                self.inner.find_packages_by_id(id, token),
            )
            .await
    }

    async fn get_package(
        &self,
        identity: &PackageIdentity,
        token: &CancellationToken,
    ) -> Result<Option<LocalPackageInfo>, ResourceError> {
        self.diagnostics
            .trace_async(
                FindLocalPackagesCapability::NAME,
                "get_package",
                self.inner.get_package(identity, token),
            )
            .await
    }

    async fn get_packages(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<LocalPackageInfo>, ResourceError> {
        self.diagnostics
            .trace_async(
                FindLocalPackagesCapability::NAME,
                "get_packages",
                self.inner.get_packages(token),
            )
            .await
    }
}
