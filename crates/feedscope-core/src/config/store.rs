//! Config store for loading and saving feedscope.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::types::ConfigScope;

use super::paths::{config_path_for_scope, default_global_dir};
use super::{FeedscopeConfig, merge_configs, parser};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    scope: ConfigScope,
    config_path: PathBuf,
    project_root: PathBuf,
}

impl ConfigStore {
    pub fn from_scope(scope: ConfigScope) -> anyhow::Result<Self> {
        let global_dir =
            default_global_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        let project_root = std::env::current_dir()?;

        Ok(Self::from_paths(scope, global_dir, project_root))
    }

    pub fn from_paths(scope: ConfigScope, global_dir: PathBuf, project_root: PathBuf) -> Self {
        let config_path = config_path_for_scope(scope, &global_dir, &project_root);
        Self {
            scope,
            config_path,
            project_root,
        }
    }

    pub fn scope(&self) -> ConfigScope {
        self.scope
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Load the file; a missing file is an empty config.
    pub fn load(&self) -> anyhow::Result<FeedscopeConfig> {
        if !self.config_path.exists() {
            return Ok(FeedscopeConfig::new());
        }
        parser::parse_feedscope_toml(&self.config_path)
    }

    pub fn save(&self, config: &FeedscopeConfig) -> anyhow::Result<()> {
        let content = parser::to_toml(config)?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.config_path, content).with_context(|| {
            format!("Failed to write config file: {}", self.config_path.display())
        })?;
        tracing::debug!(path = %self.config_path.display(), "saved config");
        Ok(())
    }
}

/// Load both scopes and merge them, project over global.
pub fn load_merged(global: &ConfigStore, project: &ConfigStore) -> anyhow::Result<FeedscopeConfig> {
    let global_config = global.load().context("Failed to load global config")?;
    let project_config = project.load().context("Failed to load project config")?;
    Ok(merge_configs(Some(global_config), Some(project_config)))
}
