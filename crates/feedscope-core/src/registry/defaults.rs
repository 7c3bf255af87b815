use std::sync::Arc;

use super::builder::{ProviderRegistry, ProviderRegistryBuilder};
use crate::error::RegistryError;
use crate::resources::http::{HttpHandler, HttpSourceProvider};
use crate::resources::local::{
    LocalDependencyInfoProvider, LocalFindPackageByIdProvider, LocalFindPackagesProvider,
};
use crate::resources::v2::{
    DependencyInfoV2FeedProvider, ODataFeedParser, RemoteV2FindPackageByIdProvider,
};
use crate::resources::v3::{
    DependencyInfoV3Provider, HttpFileSystemFindPackageByIdProvider, ServiceIndexProvider,
};
use crate::resources::{
    DependencyInfoCapability, FindLocalPackagesCapability, FindPackageByIdCapability,
    HttpSourceCapability, ServiceIndexCapability,
};

/// Knobs for the built-in provider set.
#[derive(Clone, Default)]
pub struct DefaultProviderOptions {
    /// Enables the v2 feed providers
    pub v2_parser: Option<Arc<dyn ODataFeedParser>>,
    /// Replaces the reqwest transport at the bottom of the HTTP chain
    pub http_transport: Option<Arc<dyn HttpHandler>>,
}

impl ProviderRegistryBuilder {
    /// Register every built-in provider.
    pub fn with_defaults(mut self, options: DefaultProviderOptions) -> Self {
        let DefaultProviderOptions {
            v2_parser,
            http_transport,
        } = options;

        self.add::<FindPackageByIdCapability>(Arc::new(HttpFileSystemFindPackageByIdProvider::new()));
        self.add::<FindPackageByIdCapability>(Arc::new(RemoteV2FindPackageByIdProvider::new(
            v2_parser.clone(),
        )));
        self.add::<FindPackageByIdCapability>(Arc::new(LocalFindPackageByIdProvider::v2()));
        self.add::<FindPackageByIdCapability>(Arc::new(LocalFindPackageByIdProvider::v3()));

        self.add::<FindLocalPackagesCapability>(Arc::new(LocalFindPackagesProvider::v3()));
        self.add::<FindLocalPackagesCapability>(Arc::new(LocalFindPackagesProvider::v2()));
        self.add::<FindLocalPackagesCapability>(Arc::new(LocalFindPackagesProvider::unzipped()));
        self.add::<FindLocalPackagesCapability>(Arc::new(
            LocalFindPackagesProvider::packages_config(),
        ));

        self.add::<DependencyInfoCapability>(Arc::new(DependencyInfoV3Provider::new()));
        self.add::<DependencyInfoCapability>(Arc::new(DependencyInfoV2FeedProvider::new(v2_parser)));
        self.add::<DependencyInfoCapability>(Arc::new(LocalDependencyInfoProvider::new()));

        let http = match http_transport {
            Some(transport) => HttpSourceProvider::with_transport(transport),
            None => HttpSourceProvider::new(),
        };
        self.add::<HttpSourceCapability>(Arc::new(http));
        self.add::<ServiceIndexCapability>(Arc::new(ServiceIndexProvider::new()));
        self
    }
}

impl ProviderRegistry {
    /// Registry holding only the built-in providers.
    pub fn with_defaults(options: DefaultProviderOptions) -> Result<Self, RegistryError> {
        Self::builder().with_defaults(options).build()
    }
}
