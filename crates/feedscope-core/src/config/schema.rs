//! Configuration schema for feedscope.toml
//!
//! ```toml
//! [source.nuget]
//! url = "https://api.nuget.org/v3/index.json"
//!
//! [source.local]
//! path = "~/packages"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::source::{Credentials, PackageSource, ProxySettings};

/// Root configuration structure for feedscope.toml
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedscopeConfig {
    /// Package sources by name
    #[serde(default)]
    pub source: BTreeMap<String, SourceConfigEntry>,
}

/// One `[source.<name>]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfigEntry {
    /// HTTP(S) feed address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Local folder; `~/` expands to the home directory, relative paths
    /// are resolved against the project root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_password: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for SourceConfigEntry {
    fn default() -> Self {
        Self {
            url: None,
            path: None,
            enabled: true,
            username: None,
            password: None,
            proxy: None,
            proxy_username: None,
            proxy_password: None,
        }
    }
}

impl SourceConfigEntry {
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn local(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match (&self.url, &self.path) {
            (Some(_), Some(_)) => bail!("Cannot specify both 'url' and 'path'"),
            (None, None) => bail!("Either 'url' or 'path' is required"),
            (Some(url), None) => {
                let parsed = Url::parse(url).with_context(|| format!("Invalid url: {url}"))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    bail!("Unsupported url scheme '{}': {url}", parsed.scheme());
                }
            }
            (None, Some(path)) if path.trim().is_empty() => bail!("'path' must not be empty"),
            (None, Some(_)) => {}
        }

        if self.password.is_some() && self.username.is_none() {
            bail!("'password' requires 'username'");
        }
        if let Some(proxy) = &self.proxy {
            if self.path.is_some() {
                bail!("'proxy' only applies to http sources");
            }
            Url::parse(proxy).with_context(|| format!("Invalid proxy url: {proxy}"))?;
        } else if self.proxy_username.is_some() || self.proxy_password.is_some() {
            bail!("'proxy_username' and 'proxy_password' require 'proxy'");
        }
        Ok(())
    }

    /// Build the runtime source definition.
    pub fn to_package_source(
        &self,
        name: &str,
        project_root: &Path,
        home_dir: &Path,
    ) -> anyhow::Result<PackageSource> {
        self.validate()
            .with_context(|| format!("Invalid source configuration: '{name}'"))?;

        let mut source = match (&self.url, &self.path) {
            (Some(url), _) => PackageSource::http(name, Url::parse(url)?),
            (None, Some(path)) => {
                PackageSource::local(name, resolve_path(path, project_root, home_dir))
            }
            (None, None) => bail!("Source '{name}' has no address"),
        };

        if let Some(username) = &self.username {
            source = source.with_credentials(Credentials::new(
                username,
                self.password.clone().unwrap_or_default(),
            ));
        }
        if let Some(proxy) = &self.proxy {
            let credentials = self.proxy_username.as_ref().map(|user| {
                Credentials::new(user, self.proxy_password.clone().unwrap_or_default())
            });
            source = source.with_proxy(ProxySettings {
                url: Url::parse(proxy)?,
                credentials,
            });
        }
        Ok(source.with_enabled(self.enabled))
    }
}

fn resolve_path(path: &str, project_root: &Path, home_dir: &Path) -> PathBuf {
    if path == "~" {
        return home_dir.to_path_buf();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return home_dir.join(rest);
    }
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}

impl FeedscopeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, entry) in &self.source {
            entry
                .validate()
                .with_context(|| format!("Invalid source configuration: '{name}'"))?;
        }
        Ok(())
    }

    /// Every configured source, sorted by name, disabled ones included.
    pub fn package_sources(
        &self,
        project_root: &Path,
        home_dir: &Path,
    ) -> anyhow::Result<Vec<PackageSource>> {
        self.source
            .iter()
            .map(|(name, entry)| entry.to_package_source(name, project_root, home_dir))
            .collect()
    }
}
