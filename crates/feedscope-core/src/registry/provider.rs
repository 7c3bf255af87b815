use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::descriptor::ProviderDescriptor;
use super::repository::SourceRepository;
use crate::error::ResourceError;
use crate::resources::Capability;

/// Builds the resource for capability `C` when a source supports it.
///
/// `Ok(None)` means "not applicable here" and the repository moves on to
/// the next provider in the chain. An error stops the walk.
#[async_trait]
pub trait ResourceProvider<C: Capability>: Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;

    async fn try_create(
        &self,
        repository: &SourceRepository,
        token: &CancellationToken,
    ) -> Result<Option<Arc<C::Resource>>, ResourceError>;
}
