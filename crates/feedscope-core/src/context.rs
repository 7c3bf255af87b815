//! Application context for unified dependency injection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{ConfigStore, FeedscopeConfig, load_merged};
use crate::config::paths::default_global_dir;
use crate::error::RegistryError;
use crate::registry::{DefaultProviderOptions, ProviderRegistry, RepositoryProvider};
use crate::source::PackageSource;
use crate::types::ConfigScope;

/// Paths and shared services the frontends need.
///
/// The CLI creates this once and passes it to commands.
#[derive(Debug, Clone)]
pub struct AppContext {
    home_dir: PathBuf,
    project_root: PathBuf,
    global_config_dir: PathBuf,
}

impl AppContext {
    pub fn new(home_dir: PathBuf, project_root: PathBuf) -> Self {
        let global_config_dir =
            default_global_dir().unwrap_or_else(|| home_dir.join(".config").join("feedscope"));

        Self {
            home_dir,
            project_root,
            global_config_dir,
        }
    }

    /// Create context with custom global config directory (for testing).
    pub fn with_global_config_dir(
        home_dir: PathBuf,
        project_root: PathBuf,
        global_config_dir: PathBuf,
    ) -> Self {
        Self {
            home_dir,
            project_root,
            global_config_dir,
        }
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn global_config_dir(&self) -> &Path {
        &self.global_config_dir
    }

    pub fn config_store(&self, scope: ConfigScope) -> ConfigStore {
        ConfigStore::from_paths(
            scope,
            self.global_config_dir.clone(),
            self.project_root.clone(),
        )
    }

    /// Global and project config merged.
    pub fn load_config(&self) -> anyhow::Result<FeedscopeConfig> {
        load_merged(
            &self.config_store(ConfigScope::Global),
            &self.config_store(ConfigScope::Project),
        )
    }

    /// Enabled sources from the merged config.
    pub fn active_sources(&self) -> anyhow::Result<Vec<Arc<PackageSource>>> {
        let sources = self
            .load_config()?
            .package_sources(&self.project_root, &self.home_dir)?;
        Ok(sources
            .into_iter()
            .filter(PackageSource::is_enabled)
            .map(Arc::new)
            .collect())
    }

    /// Repository provider over the built-in provider set, with diagnostics.
    pub fn repository_provider(
        &self,
        options: DefaultProviderOptions,
    ) -> Result<RepositoryProvider, RegistryError> {
        let registry = ProviderRegistry::with_defaults(options)?;
        Ok(RepositoryProvider::new(Arc::new(registry)))
    }
}
