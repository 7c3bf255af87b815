mod support;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use feedscope_core::diagnostics::{DiagnosticEvent, EventKind, SourceDiagnostics};
use feedscope_core::error::PollerError;
use feedscope_core::poller::{HealthPoller, MessageLevel, POLL_INTERVAL, ProjectLogger};
use feedscope_core::source::PackageSource;

use support::RecordingSink;

#[derive(Default)]
struct RecordingLogger {
    lines: Mutex<Vec<(MessageLevel, String)>>,
}

impl ProjectLogger for RecordingLogger {
    fn log(&self, level: MessageLevel, message: &str) {
        self.lines.lock().push((level, message.to_string()));
    }
}

fn record(diagnostics: &SourceDiagnostics, kinds: &[EventKind]) {
    let tag = Uuid::new_v4();
    for kind in kinds {
        diagnostics.record_event(DiagnosticEvent::new(
            *kind,
            tag,
            diagnostics.source_name(),
            "FindPackageByIdResource",
            "get_all_versions",
        ));
    }
}

struct Fixture {
    poller: HealthPoller,
    diagnostics: Arc<SourceDiagnostics>,
    sink: Arc<RecordingSink>,
    logger: Arc<RecordingLogger>,
}

fn fixture() -> Fixture {
    let diagnostics = Arc::new(SourceDiagnostics::new(Arc::new(PackageSource::http(
        "nuget",
        "https://api.nuget.example/v3/index.json".parse().unwrap(),
    ))));
    let sink = Arc::new(RecordingSink::default());
    let logger = Arc::new(RecordingLogger::default());
    let poller = HealthPoller::new(vec![Arc::clone(&diagnostics)], sink.clone(), logger.clone());
    Fixture {
        poller,
        diagnostics,
        sink,
        logger,
    }
}

#[tokio::test(start_paused = true)]
async fn warnings_are_reported_once_per_status() {
    let f = fixture();
    record(&f.diagnostics, &[EventKind::Started]);
    f.poller.start().unwrap();
    assert!(f.diagnostics.events().is_empty(), "start resets the sources");

    record(&f.diagnostics, &[EventKind::Started, EventKind::Cancelled]);
    tokio::time::sleep(POLL_INTERVAL + Duration::from_millis(100)).await;
    assert_eq!(
        *f.sink.warnings.lock(),
        vec!["nuget performance warning. Source is not reliable.".to_string()]
    );

    record(&f.diagnostics, &[EventKind::Started, EventKind::Failed]);
    tokio::time::sleep(POLL_INTERVAL).await;
    assert_eq!(f.sink.warnings.lock().len(), 1);

    let logged = f.logger.lines.lock();
    assert!(logged.iter().all(|(level, _)| *level == MessageLevel::Warning));
    assert!(
        logged
            .iter()
            .any(|(_, line)| line == "[nuget] 1/2 of source requests failed.")
    );
}

#[tokio::test(start_paused = true)]
async fn nothing_is_reported_before_the_first_interval() {
    let f = fixture();
    f.poller.start().unwrap();
    record(&f.diagnostics, &[EventKind::Started, EventKind::Cancelled]);

    tokio::time::sleep(POLL_INTERVAL / 2).await;
    assert!(f.sink.warnings.lock().is_empty());
    assert!(f.logger.lines.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_drains_one_last_time() {
    let f = fixture();
    f.poller.start().unwrap();
    record(&f.diagnostics, &[EventKind::Started, EventKind::TimedOut]);

    f.poller.stop().await.unwrap();
    assert!(!f.poller.is_running());
    assert_eq!(
        *f.sink.warnings.lock(),
        vec!["nuget performance warning. Source is not responsive.".to_string()]
    );

    assert_eq!(f.poller.start(), Err(PollerError::AlreadyStopped));
}

#[tokio::test]
async fn stopping_an_idle_poller_still_drains() {
    let f = fixture();
    record(&f.diagnostics, &[EventKind::Started, EventKind::Cancelled]);

    f.poller.stop().await.unwrap();
    assert_eq!(f.sink.warnings.lock().len(), 1);
    assert_eq!(f.poller.stop().await, Err(PollerError::AlreadyStopped));
}
