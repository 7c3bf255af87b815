use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use feedscope_core::diagnostics::{
    DiagnosticEvent, DiagnosticsHub, EventKind, SourceDiagnostics, SourceStatus,
};
use feedscope_core::source::PackageSource;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Record one request that ends with `kind` after `millis`.
fn request(diagnostics: &SourceDiagnostics, kind: EventKind, millis: i64) {
    let tag = Uuid::new_v4();
    let started = start();
    diagnostics.record_event(DiagnosticEvent::at(
        started,
        EventKind::Started,
        tag,
        "nuget",
        "FindPackageByIdResource",
        "get_all_versions",
    ));
    diagnostics.record_event(DiagnosticEvent::at(
        started + Duration::milliseconds(millis),
        kind,
        tag,
        "nuget",
        "FindPackageByIdResource",
        "get_all_versions",
    ));
}

fn nuget() -> Arc<PackageSource> {
    Arc::new(PackageSource::http(
        "nuget",
        "https://api.nuget.example/v3/index.json".parse().unwrap(),
    ))
}

#[test]
fn slow_and_cancelled_requests_are_reported() {
    let diagnostics = SourceDiagnostics::new(nuget());
    request(&diagnostics, EventKind::Completed, 6_000);
    request(&diagnostics, EventKind::Completed, 7_500);
    request(&diagnostics, EventKind::Cancelled, 300);
    for _ in 0..7 {
        request(&diagnostics, EventKind::Completed, 200);
    }

    let now = start() + Duration::seconds(30);
    let metrics = diagnostics.compute_metrics(now);
    assert_eq!(metrics.total, 10);
    assert_eq!(metrics.successful, 9);
    assert_eq!(metrics.slow, 2);
    assert_eq!(metrics.cancelled, 1);
    assert_eq!(metrics.failed, 0);
    assert_eq!(metrics.unresponsive, 0);

    let messages = diagnostics.diagnostic_messages(now);
    let summary: Vec<_> = messages
        .iter()
        .map(|m| (m.status, m.details.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (
                SourceStatus::SlowSource,
                "[nuget] 2/10 of source requests took more than 5s."
            ),
            (
                SourceStatus::UnreliableSource,
                "[nuget] 1/10 of source requests were cancelled."
            ),
        ]
    );

    diagnostics.reset();
    assert!(diagnostics.compute_metrics(now).is_empty());
    assert!(diagnostics.diagnostic_messages(now).is_empty());
}

#[test]
fn requests_still_running_become_unresponsive() {
    let diagnostics = SourceDiagnostics::new(nuget());
    diagnostics.record_event(DiagnosticEvent::at(
        start(),
        EventKind::Started,
        Uuid::new_v4(),
        "nuget",
        "HttpSource",
        "GET https://api.nuget.example/v3/index.json",
    ));

    let early = diagnostics.compute_metrics(start() + Duration::seconds(1));
    assert_eq!(early.incomplete, 1);
    assert_eq!(early.unresponsive, 0);

    let late = diagnostics.diagnostic_messages(start() + Duration::seconds(10));
    let statuses: Vec<_> = late.iter().map(|m| m.status).collect();
    assert_eq!(
        statuses,
        vec![SourceStatus::SlowSource, SourceStatus::UnresponsiveSource]
    );
    assert_eq!(
        late[1].details,
        "[nuget] All of 1 of source requests are not responding."
    );
}

#[test]
fn hub_reset_clears_every_source() {
    let hub = DiagnosticsHub::new();
    let nuget = hub.get_or_create(&nuget());
    let local = hub.get_or_create(&Arc::new(PackageSource::local("local", "/feeds/local")));
    request(&nuget, EventKind::Failed, 100);
    request(&local, EventKind::Completed, 100);

    assert!(Arc::ptr_eq(&nuget, &hub.get("nuget").unwrap()));
    hub.reset_all();

    for diagnostics in hub.all() {
        assert!(diagnostics.events().is_empty());
    }
}
