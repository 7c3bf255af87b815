//! Per-source resource resolution and caching.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::builder::ProviderRegistry;
use crate::diagnostics::{DiagnosticsHub, SourceDiagnostics};
use crate::error::ResourceError;
use crate::resources::Capability;
use crate::source::{FeedType, FeedTypeProbe, LayoutFeedTypeProbe, PackageSource};

type ErasedResource = Arc<dyn Any + Send + Sync>;
type ResolvedCell = OnceCell<Result<Option<ErasedResource>, ResourceError>>;

/// One package source together with its resolved resources.
///
/// Each capability is constructed at most once: concurrent callers share a
/// single construction and every later call returns the same instance (or
/// the same "not supported" answer, or the same error). Construction that
/// is cancelled leaves nothing behind, so the next caller retries.
pub struct SourceRepository {
    source: Arc<PackageSource>,
    registry: Arc<ProviderRegistry>,
    diagnostics: Option<Arc<SourceDiagnostics>>,
    probe: Arc<dyn FeedTypeProbe>,
    feed_type: Mutex<Arc<OnceCell<FeedType>>>,
    resources: Mutex<HashMap<TypeId, Arc<ResolvedCell>>>,
}

impl SourceRepository {
    pub fn new(source: impl Into<Arc<PackageSource>>, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            source: source.into(),
            registry,
            diagnostics: None,
            probe: Arc::new(LayoutFeedTypeProbe),
            feed_type: Mutex::default(),
            resources: Mutex::default(),
        }
    }

    /// Wrap diagnosable resources in tracing proxies recording into `diagnostics`.
    pub fn with_diagnostics(mut self, diagnostics: Arc<SourceDiagnostics>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn FeedTypeProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn source(&self) -> &Arc<PackageSource> {
        &self.source
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn diagnostics(&self) -> Option<Arc<SourceDiagnostics>> {
        self.diagnostics.clone()
    }

    /// Detected feed layout; probed once, failures are retried next call.
    pub async fn feed_type(&self, token: &CancellationToken) -> Result<FeedType, ResourceError> {
        let cell = self.feed_type.lock().clone();
        let feed_type = cell
            .get_or_try_init(|| async {
                let feed_type = self.probe.probe(self, token).await?;
                tracing::debug!(
                    source = self.source.name(),
                    feed_type = %feed_type,
                    "detected feed type"
                );
                Ok::<_, ResourceError>(feed_type)
            })
            .await?;
        Ok(*feed_type)
    }

    /// Resource for capability `C`, or `None` when no provider supports
    /// this source.
    pub async fn try_get_resource<C: Capability>(
        &self,
        token: &CancellationToken,
    ) -> Result<Option<Arc<C::Resource>>, ResourceError> {
        let cell = {
            let mut resources = self.resources.lock();
            Arc::clone(resources.entry(TypeId::of::<C>()).or_default())
        };

        let resolved = cell
            .get_or_try_init(|| async {
                match self.construct::<C>(token).await {
                    Err(e) if e.is_cancelled() => Err(e),
                    outcome => Ok(outcome.map(|resource| {
                        resource.map(|r| Arc::new(r) as ErasedResource)
                    })),
                }
            })
            .await?;

        match resolved {
            Ok(Some(erased)) => Ok(erased.downcast_ref::<Arc<C::Resource>>().cloned()),
            Ok(None) => Ok(None),
            Err(e) => Err(e.clone()),
        }
    }

    /// Like [`try_get_resource`](Self::try_get_resource), but unsupported
    /// capabilities are an error.
    pub async fn get_resource<C: Capability>(
        &self,
        token: &CancellationToken,
    ) -> Result<Arc<C::Resource>, ResourceError> {
        self.try_get_resource::<C>(token)
            .await?
            .ok_or_else(|| ResourceError::NotAvailable {
                capability: C::NAME,
                source_name: self.source.name().to_string(),
            })
    }

    async fn construct<C: Capability>(
        &self,
        token: &CancellationToken,
    ) -> Result<Option<Arc<C::Resource>>, ResourceError> {
        for provider in self.registry.providers::<C>() {
            if token.is_cancelled() {
                return Err(ResourceError::Cancelled);
            }
            let Some(resource) = provider.try_create(self, token).await? else {
                continue;
            };
            tracing::debug!(
                source = self.source.name(),
                capability = C::NAME,
                provider = provider.descriptor().name(),
                "resource created"
            );
            return Ok(Some(match &self.diagnostics {
                Some(diagnostics) => C::decorate(resource, diagnostics),
                None => resource,
            }));
        }
        tracing::debug!(
            source = self.source.name(),
            capability = C::NAME,
            "no provider applies"
        );
        Ok(None)
    }

    /// Drop every cached resource and the detected feed type.
    pub fn reset(&self) {
        *self.feed_type.lock() = Arc::default();
        self.resources.lock().clear();
    }
}

impl fmt::Debug for SourceRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRepository")
            .field("source", &self.source.name())
            .field("feed_type", &self.feed_type.lock().get())
            .field("cached", &self.resources.lock().len())
            .finish_non_exhaustive()
    }
}

/// Hands out one [`SourceRepository`] per source name, all sharing the same
/// registry and diagnostics hub.
pub struct RepositoryProvider {
    registry: Arc<ProviderRegistry>,
    hub: Option<Arc<DiagnosticsHub>>,
    probe: Arc<dyn FeedTypeProbe>,
    repositories: Mutex<HashMap<String, Arc<SourceRepository>>>,
}

impl RepositoryProvider {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self::with_hub(registry, Arc::new(DiagnosticsHub::new()))
    }

    pub fn with_hub(registry: Arc<ProviderRegistry>, hub: Arc<DiagnosticsHub>) -> Self {
        Self {
            registry,
            hub: Some(hub),
            probe: Arc::new(LayoutFeedTypeProbe),
            repositories: Mutex::default(),
        }
    }

    /// Repositories without tracing proxies.
    pub fn without_diagnostics(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            hub: None,
            ..Self::new(registry)
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn FeedTypeProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn hub(&self) -> Option<&Arc<DiagnosticsHub>> {
        self.hub.as_ref()
    }

    /// The repository for `source`. A source with the same name but a
    /// different definition replaces the old repository.
    pub fn create_repository(&self, source: impl Into<Arc<PackageSource>>) -> Arc<SourceRepository> {
        let source = source.into();
        let mut repositories = self.repositories.lock();
        if let Some(existing) = repositories.get(source.name())
            && existing.source() == &source
        {
            return Arc::clone(existing);
        }

        let mut repository = SourceRepository::new(Arc::clone(&source), Arc::clone(&self.registry))
            .with_probe(Arc::clone(&self.probe));
        if let Some(hub) = &self.hub {
            repository = repository.with_diagnostics(hub.get_or_create(&source));
        }
        let repository = Arc::new(repository);
        repositories.insert(source.name().to_string(), Arc::clone(&repository));
        repository
    }

    /// Known repositories, sorted by source name.
    pub fn repositories(&self) -> Vec<Arc<SourceRepository>> {
        let mut all: Vec<_> = self.repositories.lock().values().cloned().collect();
        all.sort_by(|a, b| a.source().name().cmp(b.source().name()));
        all
    }

    /// Forget cached resources of every repository and clear diagnostics.
    pub fn reset(&self) {
        for repository in self.repositories.lock().values() {
            repository.reset();
        }
        if let Some(hub) = &self.hub {
            hub.reset_all();
        }
    }
}
