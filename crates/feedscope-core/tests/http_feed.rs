mod support;

use std::sync::Arc;

use reqwest::StatusCode;
use semver::Version;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use feedscope_core::diagnostics::EventKind;
use feedscope_core::error::ResourceError;
use feedscope_core::registry::{DefaultProviderOptions, ProviderRegistry, RepositoryProvider};
use feedscope_core::resources::{
    DependencyInfoCapability, FindPackageByIdCapability, HttpSourceCapability,
    ServiceIndexCapability,
};
use feedscope_core::source::{FeedType, PackageSource};
use feedscope_core::types::{Framework, PackageIdentity};

use support::{StaticHttpHandler, manifest, package_bytes};

const INDEX: &str = "https://feed.example/v3/index.json";
const FLAT: &str = "https://feed.example/flat/";

fn provider(transport: &Arc<StaticHttpHandler>) -> RepositoryProvider {
    let registry = ProviderRegistry::with_defaults(DefaultProviderOptions {
        http_transport: Some(transport.clone()),
        ..Default::default()
    })
    .unwrap();
    RepositoryProvider::new(Arc::new(registry))
}

fn v3_transport() -> Arc<StaticHttpHandler> {
    let transport = StaticHttpHandler::new();
    transport.respond_json(
        INDEX,
        json!({
            "version": "3.0.0",
            "resources": [{"@id": FLAT, "@type": "PackageBaseAddress/3.0.0"}]
        }),
    );
    transport.respond_json(
        &format!("{FLAT}alpha/index.json"),
        json!({"versions": ["2.0.0", "1.0.0", "not-a-version"]}),
    );
    transport.respond(
        &format!("{FLAT}alpha/2.0.0/alpha.2.0.0.nupkg"),
        StatusCode::OK,
        package_bytes(&manifest("Alpha", "2.0.0", &[("Beta", ">=1.0.0")])),
    );
    transport
}

fn v3_source() -> PackageSource {
    PackageSource::http("remote", INDEX.parse().unwrap())
}

#[tokio::test]
async fn service_index_marks_feed_as_v3() {
    let transport = v3_transport();
    let provider = provider(&transport);
    let repository = provider.create_repository(v3_source());
    let token = CancellationToken::new();

    assert_eq!(repository.feed_type(&token).await.unwrap(), FeedType::HttpV3);
    let index = repository
        .get_resource::<ServiceIndexCapability>(&token)
        .await
        .unwrap();
    assert_eq!(index.endpoints("PackageBaseAddress/3.0.0").len(), 1);

    // A second probe reuses the cached index.
    repository.feed_type(&token).await.unwrap();
    assert_eq!(transport.request_count(INDEX), 1);
}

#[tokio::test]
async fn flat_container_answers_lookups() {
    let transport = v3_transport();
    let provider = provider(&transport);
    let repository = provider.create_repository(v3_source());
    let token = CancellationToken::new();

    let by_id = repository
        .get_resource::<FindPackageByIdCapability>(&token)
        .await
        .unwrap();
    assert_eq!(
        by_id.get_all_versions("Alpha", &token).await.unwrap(),
        vec![Version::new(1, 0, 0), Version::new(2, 0, 0)]
    );
    assert!(
        by_id
            .copy_package("alpha", &Version::new(1, 0, 0), &token)
            .await
            .unwrap()
            .is_none()
    );

    let deps = repository
        .get_resource::<DependencyInfoCapability>(&token)
        .await
        .unwrap();
    let info = deps
        .resolve_package(
            &PackageIdentity::new("alpha", Version::new(2, 0, 0)),
            &Framework::new("net8.0"),
            &token,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(info.identity.id, "Alpha");
    assert_eq!(info.source, "remote");
    assert_eq!(info.dependencies[0].id, "Beta");
    assert_eq!(
        info.download_uri.unwrap().as_str(),
        format!("{FLAT}alpha/2.0.0/alpha.2.0.0.nupkg")
    );
}

#[tokio::test]
async fn requests_and_calls_are_both_traced() {
    let transport = v3_transport();
    let provider = provider(&transport);
    let repository = provider.create_repository(v3_source());
    let token = CancellationToken::new();

    let by_id = repository
        .get_resource::<FindPackageByIdCapability>(&token)
        .await
        .unwrap();
    by_id.get_all_versions("alpha", &token).await.unwrap();

    let events = repository.diagnostics().unwrap().events();
    let http: Vec<_> = events.iter().filter(|e| e.resource == "HttpSource").collect();
    let calls: Vec<_> = events
        .iter()
        .filter(|e| e.resource == "FindPackageByIdResource")
        .collect();

    // Service index plus version list.
    assert_eq!(http.len(), 4);
    assert!(http.iter().any(|e| e.operation == format!("GET {INDEX}")));
    assert_eq!(
        calls.iter().map(|e| e.kind).collect::<Vec<_>>(),
        vec![EventKind::Started, EventKind::Completed]
    );

    let metrics = repository
        .diagnostics()
        .unwrap()
        .compute_metrics(chrono::Utc::now());
    assert_eq!(metrics.total, 3);
    assert_eq!(metrics.successful, 3);
}

#[tokio::test]
async fn server_errors_are_recorded_as_failures() {
    let transport = v3_transport();
    transport.respond(
        &format!("{FLAT}broken/index.json"),
        StatusCode::INTERNAL_SERVER_ERROR,
        "",
    );
    let provider = provider(&transport);
    let repository = provider.create_repository(v3_source());
    let token = CancellationToken::new();

    let by_id = repository
        .get_resource::<FindPackageByIdCapability>(&token)
        .await
        .unwrap();
    let err = by_id.get_all_versions("broken", &token).await.unwrap_err();
    assert!(matches!(err, ResourceError::Status { status: 500, .. }));

    let metrics = repository
        .diagnostics()
        .unwrap()
        .compute_metrics(chrono::Utc::now());
    assert_eq!(metrics.failed, 1);
    let messages = repository
        .diagnostics()
        .unwrap()
        .diagnostic_messages(chrono::Utc::now());
    assert!(messages.iter().any(|m| m.details.ends_with("failed.")));
}

#[tokio::test]
async fn missing_service_index_is_an_error() {
    let transport = StaticHttpHandler::new();
    let provider = provider(&transport);
    let repository = provider.create_repository(v3_source());

    let err = repository
        .feed_type(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ResourceError::Status { status: 404, .. }));
}

#[tokio::test]
async fn plain_url_is_v2_without_parser() {
    let transport = StaticHttpHandler::new();
    let provider = provider(&transport);
    let repository = provider.create_repository(PackageSource::http(
        "legacy",
        "https://legacy.example/api/v2/".parse().unwrap(),
    ));
    let token = CancellationToken::new();

    assert_eq!(repository.feed_type(&token).await.unwrap(), FeedType::HttpV2);
    assert!(
        repository
            .try_get_resource::<HttpSourceCapability>(&token)
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        repository
            .try_get_resource::<FindPackageByIdCapability>(&token)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        repository
            .try_get_resource::<DependencyInfoCapability>(&token)
            .await
            .unwrap()
            .is_none()
    );
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn failed_service_index_sticks_until_reset() {
    let transport = StaticHttpHandler::new();
    transport.respond(INDEX, StatusCode::SERVICE_UNAVAILABLE, "");
    let provider = provider(&transport);
    let repository = provider.create_repository(v3_source());
    let token = CancellationToken::new();

    let err = repository.feed_type(&token).await.unwrap_err();
    assert!(matches!(err, ResourceError::Status { status: 503, .. }));

    // The feed recovers, but the failed index is still the cached answer.
    transport.respond_json(INDEX, json!({"version": "3.0.0", "resources": []}));
    let err = repository.feed_type(&token).await.unwrap_err();
    assert!(matches!(err, ResourceError::Status { status: 503, .. }));
    assert_eq!(transport.request_count(INDEX), 1);

    provider.reset();
    assert_eq!(repository.feed_type(&token).await.unwrap(), FeedType::HttpV3);
    assert_eq!(transport.request_count(INDEX), 2);
}
