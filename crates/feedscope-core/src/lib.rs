//! Feedscope Core Library
//!
//! Resolves typed capabilities (dependency lookup, package-by-id lookup,
//! local package enumeration, HTTP transport) for heterogeneous package
//! sources, and keeps per-source health diagnostics for every operation
//! those capabilities perform.

pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod poller;
pub mod registry;
pub mod resources;
pub mod source;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, FeedscopeConfig, SourceConfigEntry};
    pub use crate::context::AppContext;
    pub use crate::types::ConfigScope;

    // Sources
    pub use crate::source::{FeedType, FeedTypeProbe, PackageSource, SourceTransport};

    // Diagnostics
    pub use crate::diagnostics::{
        DiagnosticEvent, DiagnosticMessage, DiagnosticsHub, EventKind, HealthMetrics,
        SourceDiagnostics, SourceStatus,
    };

    // Resources
    pub use crate::resources::{
        Capability, DependencyInfoCapability, DependencyInfoResource, FindLocalPackagesCapability,
        FindLocalPackagesResource, FindPackageByIdCapability, FindPackageByIdResource,
        HttpSourceCapability, ServiceIndexCapability,
    };

    // Registry
    pub use crate::registry::{
        ProviderDescriptor, ProviderRegistry, RepositoryProvider, ResourceProvider,
        SourceRepository,
    };

    // Poller
    pub use crate::poller::{ActionEventSink, HealthPoller, ProjectLogger};

    // Errors
    pub use crate::error::{PollerError, RegistryError, ResourceError};

    // Package model
    pub use crate::types::{Framework, PackageIdentity};
}
