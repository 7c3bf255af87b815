//! Per-source event log and operation tracer.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use super::event::{DiagnosticEvent, EventKind};
use super::message::{DiagnosticMessage, messages_for};
use super::metrics::{HealthMetrics, compute_metrics};
use crate::error::ResourceError;
use crate::source::PackageSource;

type EventLog = Mutex<Vec<DiagnosticEvent>>;

/// Errors that know which terminal event they represent.
pub trait TracedError {
    fn terminal_kind(&self) -> EventKind {
        EventKind::Failed
    }
}

impl TracedError for ResourceError {
    fn terminal_kind(&self) -> EventKind {
        match self {
            Self::Cancelled => EventKind::Cancelled,
            Self::TimedOut(_) => EventKind::TimedOut,
            _ => EventKind::Failed,
        }
    }
}

impl TracedError for anyhow::Error {
    fn terminal_kind(&self) -> EventKind {
        self.downcast_ref::<ResourceError>()
            .map(TracedError::terminal_kind)
            .unwrap_or(EventKind::Failed)
    }
}

/// Health diagnostics for one package source.
///
/// The log is append-only. `reset` swaps in a fresh log; traces already
/// in flight keep writing to the log they captured when they started, so
/// their events never reach the new one.
pub struct SourceDiagnostics {
    source: Arc<PackageSource>,
    log: RwLock<Arc<EventLog>>,
}

impl SourceDiagnostics {
    pub fn new(source: Arc<PackageSource>) -> Self {
        Self {
            source,
            log: RwLock::new(Arc::default()),
        }
    }

    pub fn source(&self) -> &Arc<PackageSource> {
        &self.source
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    fn current_log(&self) -> Arc<EventLog> {
        self.log.read().clone()
    }

    pub fn record_event(&self, event: DiagnosticEvent) {
        self.current_log().lock().push(event);
    }

    /// Point-in-time copy of the log.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.current_log().lock().clone()
    }

    pub fn compute_metrics(&self, reference_time: DateTime<Utc>) -> HealthMetrics {
        compute_metrics(&self.events(), reference_time)
    }

    pub fn diagnostic_messages(&self, reference_time: DateTime<Utc>) -> Vec<DiagnosticMessage> {
        messages_for(self.source_name(), &self.compute_metrics(reference_time))
    }

    /// Discard every recorded event.
    pub fn reset(&self) {
        *self.log.write() = Arc::default();
        tracing::debug!(source = %self.source_name(), "Diagnostics reset");
    }

    /// Trace an async operation.
    ///
    /// Records `Started`, then `Completed` or the error's terminal kind.
    /// If the future is dropped before it finishes, `Cancelled` is recorded.
    /// The result is returned unchanged.
    pub async fn trace_async<T, E, F>(&self, resource: &str, operation: &str, work: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: TracedError,
    {
        let scope = TraceScope::begin(self, resource, operation);
        let result = work.await;
        scope.finish(outcome_kind(&result));
        result
    }

    /// Trace a synchronous operation. A panic records `Failed` and keeps
    /// unwinding.
    pub fn trace<T, E, F>(&self, resource: &str, operation: &str, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: TracedError,
    {
        let scope = TraceScope::begin(self, resource, operation);
        let result = work();
        scope.finish(outcome_kind(&result));
        result
    }
}

impl std::fmt::Debug for SourceDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDiagnostics")
            .field("source", &self.source_name())
            .field("events", &self.current_log().lock().len())
            .finish()
    }
}

fn outcome_kind<T, E: TracedError>(result: &Result<T, E>) -> EventKind {
    match result {
        Ok(_) => EventKind::Completed,
        Err(e) => e.terminal_kind(),
    }
}

/// Records the terminal event of a trace exactly once, including when
/// the traced work is dropped or panics.
struct TraceScope {
    log: Arc<EventLog>,
    tag: Uuid,
    source: String,
    resource: String,
    operation: String,
    finished: bool,
}

impl TraceScope {
    fn begin(diagnostics: &SourceDiagnostics, resource: &str, operation: &str) -> Self {
        let scope = Self {
            log: diagnostics.current_log(),
            tag: Uuid::new_v4(),
            source: diagnostics.source_name().to_string(),
            resource: resource.to_string(),
            operation: operation.to_string(),
            finished: false,
        };
        scope.record(EventKind::Started);
        scope
    }

    fn record(&self, kind: EventKind) {
        let event = DiagnosticEvent::new(
            kind,
            self.tag,
            self.source.as_str(),
            self.resource.as_str(),
            self.operation.as_str(),
        );
        self.log.lock().push(event);
    }

    fn finish(mut self, kind: EventKind) {
        self.finished = true;
        self.record(kind);
    }
}

impl Drop for TraceScope {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let kind = if std::thread::panicking() {
            EventKind::Failed
        } else {
            EventKind::Cancelled
        };
        self.record(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    fn diagnostics() -> SourceDiagnostics {
        SourceDiagnostics::new(Arc::new(PackageSource::local("feed", "/tmp/feed")))
    }

    fn kinds(d: &SourceDiagnostics) -> Vec<EventKind> {
        d.events().iter().map(|e| e.kind).collect()
    }

    #[tokio::test]
    async fn test_trace_async_success() {
        let d = diagnostics();
        let value: Result<u32, ResourceError> =
            d.trace_async("Res", "op", async { Ok(7) }).await;
        assert_eq!(value.unwrap(), 7);
        assert_eq!(kinds(&d), vec![EventKind::Started, EventKind::Completed]);

        let events = d.events();
        assert_eq!(events[0].tag, events[1].tag);
        assert_eq!(events[0].source, "feed");
        assert_eq!(events[0].resource, "Res");
        assert_eq!(events[0].operation, "op");
    }

    #[tokio::test]
    async fn test_trace_async_failure_keeps_error() {
        let d = diagnostics();
        let result: Result<(), ResourceError> = d
            .trace_async("Res", "op", async {
                Err(ResourceError::Status {
                    url: "http://x".into(),
                    status: 500,
                })
            })
            .await;
        assert!(matches!(
            result,
            Err(ResourceError::Status { status: 500, .. })
        ));
        assert_eq!(kinds(&d), vec![EventKind::Started, EventKind::Failed]);
    }

    #[tokio::test]
    async fn test_trace_async_cancelled_and_timed_out() {
        let d = diagnostics();
        let cancelled: Result<(), ResourceError> = d
            .trace_async("Res", "op", async { Err(ResourceError::Cancelled) })
            .await;
        assert!(cancelled.unwrap_err().is_cancelled());

        let timed_out: Result<(), ResourceError> = d
            .trace_async("Res", "op", async {
                Err(ResourceError::TimedOut("http://x".into()))
            })
            .await;
        assert!(timed_out.is_err());

        let terminal: Vec<_> = kinds(&d)
            .into_iter()
            .filter(|k| k.is_terminal())
            .collect();
        assert_eq!(terminal, vec![EventKind::Cancelled, EventKind::TimedOut]);
    }

    #[tokio::test]
    async fn test_dropped_trace_records_cancelled() {
        let d = diagnostics();
        {
            let traced = d.trace_async::<(), ResourceError, _>(
                "Res",
                "op",
                std::future::pending(),
            );
            let outcome =
                tokio::time::timeout(std::time::Duration::from_millis(10), traced).await;
            assert!(outcome.is_err());
        }
        assert_eq!(kinds(&d), vec![EventKind::Started, EventKind::Cancelled]);
    }

    #[test]
    fn test_sync_trace_with_anyhow() {
        let d = diagnostics();
        let result: anyhow::Result<()> =
            d.trace("Res", "op", || Err(anyhow::Error::new(ResourceError::Cancelled)));
        assert!(result.is_err());
        assert_eq!(kinds(&d), vec![EventKind::Started, EventKind::Cancelled]);
    }

    #[test]
    fn test_sync_trace_panic_records_failed() {
        let d = diagnostics();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), ResourceError> = d.trace("Res", "op", || panic!("boom"));
        }));
        assert!(outcome.is_err());
        assert_eq!(kinds(&d), vec![EventKind::Started, EventKind::Failed]);
    }

    #[tokio::test]
    async fn test_reset_detaches_in_flight_traces() {
        let d = Arc::new(diagnostics());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let traced = {
            let d = Arc::clone(&d);
            tokio::spawn(async move {
                d.trace_async::<(), ResourceError, _>("Res", "op", async move {
                    let _ = rx.await;
                    Ok(())
                })
                .await
            })
        };

        while d.events().is_empty() {
            tokio::task::yield_now().await;
        }
        d.reset();
        tx.send(()).unwrap();
        traced.await.unwrap().unwrap();

        assert!(d.events().is_empty());
        assert!(d.diagnostic_messages(Utc::now()).is_empty());
    }
}
