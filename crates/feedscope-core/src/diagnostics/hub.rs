//! Lazily created diagnostics stores, one per source.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::store::SourceDiagnostics;
use crate::source::PackageSource;

/// Owns the diagnostics store of every source seen by one registry.
#[derive(Debug, Default)]
pub struct DiagnosticsHub {
    stores: Mutex<HashMap<String, Arc<SourceDiagnostics>>>,
}

impl DiagnosticsHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store for `source`, created on first use. Keyed by source name.
    pub fn get_or_create(&self, source: &Arc<PackageSource>) -> Arc<SourceDiagnostics> {
        let mut stores = self.stores.lock();
        let store = stores
            .entry(source.name().to_string())
            .or_insert_with(|| Arc::new(SourceDiagnostics::new(Arc::clone(source))));
        Arc::clone(store)
    }

    pub fn get(&self, source_name: &str) -> Option<Arc<SourceDiagnostics>> {
        self.stores.lock().get(source_name).cloned()
    }

    /// Every store, sorted by source name.
    pub fn all(&self) -> Vec<Arc<SourceDiagnostics>> {
        let mut stores: Vec<_> = self.stores.lock().values().cloned().collect();
        stores.sort_by(|a, b| a.source_name().cmp(b.source_name()));
        stores
    }

    pub fn reset_all(&self) {
        for store in self.all() {
            store.reset();
        }
    }
}
