//! Configuration management for different scopes
//!
//! Two scopes are supported:
//! - Global: `<config dir>/feedscope/feedscope.toml`
//! - Project: `<project>/feedscope.toml`, overriding global entries

pub mod merge;
pub mod parser;
pub mod paths;
pub mod schema;
pub mod store;

pub use merge::merge_configs;
pub use parser::{parse_feedscope_toml, parse_feedscope_toml_str, to_toml};
pub use paths::config_path_for_scope;
pub use schema::{FeedscopeConfig, SourceConfigEntry};
pub use store::{ConfigStore, load_merged};
