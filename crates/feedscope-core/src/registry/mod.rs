//! Provider registry and per-source repositories
//!
//! Providers declare which capability they build, where they sit in that
//! capability's chain and which other capabilities they need while
//! building. The registry orders each chain once; a [`SourceRepository`]
//! walks it lazily and caches the first resource produced.

mod builder;
mod defaults;
mod descriptor;
mod ordering;
mod provider;
mod repository;

pub use builder::{ProviderRegistry, ProviderRegistryBuilder};
pub use defaults::DefaultProviderOptions;
pub use descriptor::{ProviderDescriptor, ProviderPosition};
pub use provider::ResourceProvider;
pub use repository::{RepositoryProvider, SourceRepository};
