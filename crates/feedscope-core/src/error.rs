//! Error types for resource resolution, registry construction and polling.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

/// Errors raised while constructing or invoking a resource.
///
/// Clonable so a failed construction can be shared by every caller that
/// coalesced on it.
#[derive(Debug, Clone, Error)]
pub enum ResourceError {
    /// The caller's cancellation token fired
    #[error("operation was cancelled")]
    Cancelled,

    /// The underlying transport gave up waiting
    #[error("request timed out: {0}")]
    TimedOut(String),

    /// No provider in the chain produced the capability
    #[error("{capability} is not available for source '{source_name}'")]
    NotAvailable {
        capability: &'static str,
        source_name: String,
    },

    /// Network-level HTTP failure
    #[error("HTTP request to {url} failed")]
    Http {
        url: String,
        #[source]
        error: Arc<reqwest::Error>,
    },

    /// Unexpected HTTP status
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Filesystem failure
    #[error("I/O error at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: Arc<std::io::Error>,
    },

    /// Package archive could not be opened
    #[error("invalid package archive {origin}")]
    Archive {
        origin: String,
        #[source]
        error: Arc<zip::result::ZipError>,
    },

    /// A document was fetched but could not be understood
    #[error("invalid payload from {origin}: {message}")]
    InvalidPayload { origin: String, message: String },

    /// A worker task died before producing a result
    #[error("background task failed: {0}")]
    Task(String),
}

impl ResourceError {
    pub fn io(path: &Path, error: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            error: Arc::new(error),
        }
    }

    /// Map a reqwest failure, keeping timeouts distinguishable.
    pub fn http(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::TimedOut(url.to_string());
        }
        Self::Http {
            url: url.to_string(),
            error: Arc::new(error),
        }
    }

    pub fn archive(origin: impl Into<String>, error: zip::result::ZipError) -> Self {
        Self::Archive {
            origin: origin.into(),
            error: Arc::new(error),
        }
    }

    pub fn invalid_payload(origin: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::InvalidPayload {
            origin: origin.into(),
            message: message.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Provider registry configuration errors. Fatal at build time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("provider ordering for {capability} contains a cycle: {}", cycle.join(" -> "))]
    Cycle {
        capability: &'static str,
        cycle: Vec<String>,
    },

    #[error("provider '{provider}' for {capability} references unknown provider '{reference}'")]
    UnknownReference {
        capability: &'static str,
        provider: String,
        reference: String,
    },

    #[error("provider '{provider}' is registered more than once for {capability}")]
    DuplicateProvider {
        capability: &'static str,
        provider: String,
    },

    #[error("capability dependencies contain a cycle: {}", cycle.join(" -> "))]
    CapabilityCycle { cycle: Vec<String> },
}

/// Health poller lifecycle errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollerError {
    #[error("health poller is already running")]
    AlreadyRunning,

    #[error("health poller was stopped and cannot be restarted")]
    AlreadyStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_available_message() {
        let err = ResourceError::NotAvailable {
            capability: "FindPackageByIdResource",
            source_name: "nuget".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "FindPackageByIdResource is not available for source 'nuget'"
        );
    }

    #[test]
    fn test_cycle_message_lists_path() {
        let err = RegistryError::Cycle {
            capability: "FindPackageByIdResource",
            cycle: vec!["A".into(), "B".into(), "A".into()],
        };
        assert!(err.to_string().ends_with("A -> B -> A"));
    }

    #[test]
    fn test_io_error_keeps_source() {
        let err = ResourceError::io(
            Path::new("/tmp/feed"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_cancelled());
    }
}
