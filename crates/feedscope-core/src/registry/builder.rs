//! Registration and validation of provider chains.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use super::descriptor::ProviderDescriptor;
use super::ordering::{order_providers, topological_order};
use super::provider::ResourceProvider;
use crate::error::RegistryError;
use crate::resources::Capability;

struct Chain<C: Capability> {
    providers: Vec<Arc<dyn ResourceProvider<C>>>,
}

trait ErasedChain: Send + Sync {
    fn capability(&self) -> &'static str;
    fn descriptors(&self) -> Vec<&ProviderDescriptor>;
    fn reorder(&mut self, order: &[usize]);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<C: Capability> ErasedChain for Chain<C> {
    fn capability(&self) -> &'static str {
        C::NAME
    }

    fn descriptors(&self) -> Vec<&ProviderDescriptor> {
        self.providers.iter().map(|p| p.descriptor()).collect()
    }

    fn reorder(&mut self, order: &[usize]) {
        self.providers = order
            .iter()
            .map(|&i| Arc::clone(&self.providers[i]))
            .collect();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Collects providers; [`build`](Self::build) computes and validates the
/// order of every chain.
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    chains: HashMap<TypeId, Box<dyn ErasedChain>>,
}

impl ProviderRegistryBuilder {
    pub fn register<C: Capability>(mut self, provider: Arc<dyn ResourceProvider<C>>) -> Self {
        self.add(provider);
        self
    }

    pub fn add<C: Capability>(&mut self, provider: Arc<dyn ResourceProvider<C>>) {
        let chain = self
            .chains
            .entry(TypeId::of::<C>())
            .or_insert_with(|| Box::new(Chain::<C> { providers: Vec::new() }));
        if let Some(chain) = chain.as_any_mut().downcast_mut::<Chain<C>>() {
            chain.providers.push(provider);
        }
    }

    pub fn build(mut self) -> Result<ProviderRegistry, RegistryError> {
        let mut chains: Vec<_> = self.chains.values_mut().collect();
        chains.sort_by_key(|chain| chain.capability());

        for chain in chains {
            let order = order_providers(chain.capability(), &chain.descriptors())?;
            chain.reorder(&order);
        }

        check_capability_graph(self.chains.values().map(|c| c.as_ref()))?;
        tracing::debug!(capabilities = self.chains.len(), "provider registry built");
        Ok(ProviderRegistry {
            chains: self.chains,
        })
    }
}

/// Reject construction-time requirements that loop between capabilities.
fn check_capability_graph<'a>(
    chains: impl Iterator<Item = &'a dyn ErasedChain>,
) -> Result<(), RegistryError> {
    let mut requires: BTreeMap<&'static str, BTreeSet<&'static str>> = BTreeMap::new();
    for chain in chains {
        let entry = requires.entry(chain.capability()).or_default();
        for descriptor in chain.descriptors() {
            entry.extend(descriptor.required_capabilities().iter().copied());
        }
    }

    let names: Vec<&'static str> = requires
        .keys()
        .copied()
        .chain(requires.values().flatten().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let index: HashMap<&str, usize> = names.iter().enumerate().map(|(i, n)| (*n, i)).collect();

    let mut edges = vec![BTreeSet::new(); names.len()];
    for (capability, required) in &requires {
        for r in required {
            edges[index[capability]].insert(index[r]);
        }
    }

    topological_order(&edges)
        .map(|_| ())
        .map_err(|cycle| RegistryError::CapabilityCycle {
            cycle: cycle.into_iter().map(|i| names[i].to_string()).collect(),
        })
}

/// Immutable, ordered provider chains keyed by capability.
pub struct ProviderRegistry {
    chains: HashMap<TypeId, Box<dyn ErasedChain>>,
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Providers for `C` in evaluation order. Empty when none registered.
    pub fn providers<C: Capability>(&self) -> &[Arc<dyn ResourceProvider<C>>] {
        self.chains
            .get(&TypeId::of::<C>())
            .and_then(|chain| chain.as_any().downcast_ref::<Chain<C>>())
            .map(|chain| chain.providers.as_slice())
            .unwrap_or(&[])
    }

    pub fn provider_names<C: Capability>(&self) -> Vec<&str> {
        self.providers::<C>()
            .iter()
            .map(|p| p.descriptor().name())
            .collect()
    }

    /// Every registered descriptor, grouped by capability name.
    pub fn describe(&self) -> BTreeMap<&'static str, Vec<&ProviderDescriptor>> {
        self.chains
            .values()
            .map(|chain| (chain.capability(), chain.descriptors()))
            .collect()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chains: BTreeMap<_, Vec<_>> = self
            .describe()
            .into_iter()
            .map(|(cap, ds)| (cap, ds.into_iter().map(|d| d.name()).collect()))
            .collect();
        f.debug_struct("ProviderRegistry")
            .field("chains", &chains)
            .finish()
    }
}
