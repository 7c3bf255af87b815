//! Package source definitions.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

/// Transport used to reach a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceTransport {
    /// Folder on the local filesystem (or a mounted share)
    Local,
    /// HTTP(S) feed
    Http,
}

/// Where a source lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceAddress {
    Local(PathBuf),
    Http(Url),
}

/// Basic credentials for a feed or a proxy.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Proxy used for HTTP sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxySettings {
    pub url: Url,
    pub credentials: Option<Credentials>,
}

/// Identity of a package feed.
///
/// Owned by configuration and shared by `Arc` with repositories,
/// diagnostics and the poller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageSource {
    name: String,
    address: SourceAddress,
    enabled: bool,
    credentials: Option<Credentials>,
    proxy: Option<ProxySettings>,
}

impl PackageSource {
    /// Create a local folder source.
    pub fn local(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::with_address(name, SourceAddress::Local(path.into()))
    }

    /// Create an HTTP feed source.
    pub fn http(name: impl Into<String>, url: Url) -> Self {
        Self::with_address(name, SourceAddress::Http(url))
    }

    fn with_address(name: impl Into<String>, address: SourceAddress) -> Self {
        Self {
            name: name.into(),
            address,
            enabled: true,
            credentials: None,
            proxy: None,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &SourceAddress {
        &self.address
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn proxy(&self) -> Option<&ProxySettings> {
        self.proxy.as_ref()
    }

    pub fn transport(&self) -> SourceTransport {
        match self.address {
            SourceAddress::Local(_) => SourceTransport::Local,
            SourceAddress::Http(_) => SourceTransport::Http,
        }
    }

    pub fn is_http(&self) -> bool {
        self.transport() == SourceTransport::Http
    }

    pub fn is_local(&self) -> bool {
        self.transport() == SourceTransport::Local
    }

    pub fn local_path(&self) -> Option<&Path> {
        match &self.address {
            SourceAddress::Local(path) => Some(path),
            SourceAddress::Http(_) => None,
        }
    }

    pub fn url(&self) -> Option<&Url> {
        match &self.address {
            SourceAddress::Http(url) => Some(url),
            SourceAddress::Local(_) => None,
        }
    }

    /// True for HTTP sources whose address points at a JSON document
    /// (a v3 service index).
    pub fn is_json_index(&self) -> bool {
        self.url()
            .map(|u| u.path().to_ascii_lowercase().ends_with(".json"))
            .unwrap_or(false)
    }

    /// Address for display purposes.
    pub fn display_address(&self) -> String {
        match &self.address {
            SourceAddress::Local(path) => path.display().to_string(),
            SourceAddress::Http(url) => url.to_string(),
        }
    }
}
