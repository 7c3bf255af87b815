//! Config path resolution helpers.

use std::path::{Path, PathBuf};

use crate::types::ConfigScope;

pub const CONFIG_FILE_NAME: &str = "feedscope.toml";

pub fn config_path_for_scope(scope: ConfigScope, global_dir: &Path, project_root: &Path) -> PathBuf {
    match scope {
        ConfigScope::Global => global_dir.join(CONFIG_FILE_NAME),
        ConfigScope::Project => project_root.join(CONFIG_FILE_NAME),
    }
}

/// `<config dir>/feedscope`, if the platform has a config dir.
pub fn default_global_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("feedscope"))
}
