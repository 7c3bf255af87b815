#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use semver::Version;
use tokio_util::sync::CancellationToken;

use feedscope_core::error::ResourceError;
use feedscope_core::poller::ActionEventSink;
use feedscope_core::resources::archive::pack_manifest;
use feedscope_core::resources::{HttpHandler, HttpRequest, HttpResponse};
use feedscope_core::types::{DependencyGroup, Framework, PackageDependency, PackageManifest};

/// Serves canned responses by URL; anything else is a 404.
#[derive(Default)]
pub struct StaticHttpHandler {
    responses: Mutex<HashMap<String, (StatusCode, Vec<u8>)>>,
    delays: Mutex<HashMap<String, Duration>>,
    requests: Mutex<Vec<String>>,
}

impl StaticHttpHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, status: StatusCode, body: impl Into<Vec<u8>>) {
        self.responses
            .lock()
            .insert(url.to_string(), (status, body.into()));
    }

    pub fn respond_json(&self, url: &str, body: serde_json::Value) {
        self.respond(url, StatusCode::OK, body.to_string());
    }

    /// Hold responses for `url` back by `delay`.
    pub fn delay(&self, url: &str, delay: Duration) {
        self.delays.lock().insert(url.to_string(), delay);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl HttpHandler for StaticHttpHandler {
    async fn send(
        &self,
        request: HttpRequest,
        token: &CancellationToken,
    ) -> Result<HttpResponse, ResourceError> {
        let url = request.url.to_string();
        self.requests.lock().push(url.clone());

        let delay = self.delays.lock().get(&url).copied();
        if let Some(delay) = delay {
            tokio::select! {
                _ = token.cancelled() => return Err(ResourceError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let response = self.responses.lock().get(&url).cloned();
        Ok(match response {
            Some((status, body)) => HttpResponse::new(status, body),
            None => HttpResponse::new(StatusCode::NOT_FOUND, Vec::new()),
        })
    }
}

/// Records every warning it receives.
#[derive(Default)]
pub struct RecordingSink {
    pub warnings: Mutex<Vec<String>>,
}

impl ActionEventSink for RecordingSink {
    fn on_warning(&self, message: &str) -> anyhow::Result<()> {
        self.warnings.lock().push(message.to_string());
        Ok(())
    }
}

pub fn manifest(id: &str, version: &str, dependencies: &[(&str, &str)]) -> PackageManifest {
    let dependencies = dependencies
        .iter()
        .map(|(id, range)| PackageDependency {
            id: id.to_string(),
            range: range.parse().expect("valid range"),
        })
        .collect::<Vec<_>>();
    PackageManifest {
        id: id.to_string(),
        version: Version::parse(version).expect("valid version"),
        description: None,
        dependency_groups: vec![
            DependencyGroup {
                framework: Some(Framework::new("net8.0")),
                dependencies: dependencies.clone(),
            },
            DependencyGroup {
                framework: None,
                dependencies: Vec::new(),
            },
        ],
    }
}

pub fn package_bytes(manifest: &PackageManifest) -> Vec<u8> {
    pack_manifest(manifest).expect("pack manifest")
}

/// Write a package archive to `root/relative`, creating parent folders.
pub fn write_package(root: &Path, relative: &str, manifest: &PackageManifest) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create package folder");
    }
    std::fs::write(path, package_bytes(manifest)).expect("write package");
}
