//! Static provider metadata.

use std::fmt;

use crate::resources::Capability;

/// Where a provider sits in its capability's chain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProviderPosition {
    #[default]
    Unconstrained,
    /// Ahead of every provider not also marked `First`
    First,
    /// Behind every provider not also marked `Last`
    Last,
    Before(String),
    After(String),
}

impl fmt::Display for ProviderPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconstrained => f.write_str("-"),
            Self::First => f.write_str("first"),
            Self::Last => f.write_str("last"),
            Self::Before(name) => write!(f, "before {name}"),
            Self::After(name) => write!(f, "after {name}"),
        }
    }
}

/// Name, capability, ordering constraint and construction-time
/// requirements of a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    name: String,
    capability: &'static str,
    position: ProviderPosition,
    requires: Vec<&'static str>,
}

impl ProviderDescriptor {
    pub fn new<C: Capability>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capability: C::NAME,
            position: ProviderPosition::Unconstrained,
            requires: Vec::new(),
        }
    }

    pub fn before(self, provider: impl Into<String>) -> Self {
        self.with_position(ProviderPosition::Before(provider.into()))
    }

    pub fn after(self, provider: impl Into<String>) -> Self {
        self.with_position(ProviderPosition::After(provider.into()))
    }

    pub fn first(self) -> Self {
        self.with_position(ProviderPosition::First)
    }

    pub fn last(self) -> Self {
        self.with_position(ProviderPosition::Last)
    }

    pub fn with_position(mut self, position: ProviderPosition) -> Self {
        self.position = position;
        self
    }

    /// Declare that construction resolves capability `D` on the same source.
    pub fn requires<D: Capability>(mut self) -> Self {
        if !self.requires.contains(&D::NAME) {
            self.requires.push(D::NAME);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capability(&self) -> &'static str {
        self.capability
    }

    pub fn position(&self) -> &ProviderPosition {
        &self.position
    }

    pub fn required_capabilities(&self) -> &[&'static str] {
        &self.requires
    }
}
