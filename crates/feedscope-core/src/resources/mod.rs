//! Capabilities and the resources that implement them.
//!
//! A capability is a marker type implementing [`Capability`]; its
//! `Resource` is the trait object (or concrete type) callers receive from
//! a repository. Concrete resources exist for local folders, v3 flat
//! containers, v2 feeds and HTTP transport.

pub mod archive;
mod capability;
pub mod http;
pub mod local;
pub mod proxy;
pub mod v2;
pub mod v3;

pub use capability::{
    Capability, DependencyInfoCapability, DependencyInfoResource, FindLocalPackagesCapability,
    FindLocalPackagesResource, FindPackageByIdCapability, FindPackageByIdResource,
    HttpSourceCapability, ServiceIndexCapability, cancellable,
};
pub use http::{HttpHandler, HttpRequest, HttpResponse, HttpSource, HttpSourceProvider};
pub use proxy::{DependencyInfoProxy, FindLocalPackagesProxy, FindPackageByIdProxy};
pub use v2::{ODataFeedParser, V2FeedPackage, V2FeedPage};
pub use v3::{ServiceIndexResource, PACKAGE_BASE_ADDRESS};
