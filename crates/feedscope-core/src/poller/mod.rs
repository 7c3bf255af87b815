//! Background health polling
//!
//! [`HealthPoller`] periodically reads the diagnostic messages of a fixed
//! set of sources, mirrors them to a [`ProjectLogger`] and reports each
//! new (source, status) pair once to an [`ActionEventSink`].

mod sink;

pub use sink::{ActionEventSink, MessageLevel, ProjectLogger, TracingLogger};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::diagnostics::{SourceDiagnostics, SourceStatus, format_warning};
use crate::error::PollerError;

/// Delay between two drains.
pub const POLL_INTERVAL: Duration = Duration::from_millis(5500);

enum PollerState {
    Idle,
    Running {
        cancel: CancellationToken,
        task: JoinHandle<()>,
    },
    Stopped,
}

struct Drainer {
    sources: Vec<Arc<SourceDiagnostics>>,
    sink: Arc<dyn ActionEventSink>,
    logger: Arc<dyn ProjectLogger>,
    reported: Mutex<HashSet<(String, SourceStatus)>>,
}

impl Drainer {
    /// Read every source once and report warnings not reported before.
    fn drain(&self) {
        let now = Utc::now();
        for diagnostics in &self.sources {
            let messages = diagnostics.diagnostic_messages(now);
            if messages.is_empty() {
                continue;
            }

            for message in &messages {
                self.logger.log(MessageLevel::Warning, &message.details);
            }

            let name = diagnostics.source_name();
            let fresh: Vec<SourceStatus> = {
                let mut reported = self.reported.lock();
                messages
                    .iter()
                    .filter(|m| reported.insert((name.to_string(), m.status)))
                    .map(|m| m.status)
                    .collect()
            };

            for status in fresh {
                let warning = format_warning(name, status);
                debug!(source = name, %status, "reporting source warning");
                if let Err(e) = self.sink.on_warning(&warning) {
                    warn!(source = name, error = %e, "action event sink rejected warning");
                }
            }
        }
    }

    fn reset(&self) {
        for diagnostics in &self.sources {
            diagnostics.reset();
        }
        self.reported.lock().clear();
    }
}

/// One-shot poller: `Idle -> Running -> Stopped`.
pub struct HealthPoller {
    drainer: Arc<Drainer>,
    interval: Duration,
    state: Mutex<PollerState>,
}

impl HealthPoller {
    pub fn new(
        sources: Vec<Arc<SourceDiagnostics>>,
        sink: Arc<dyn ActionEventSink>,
        logger: Arc<dyn ProjectLogger>,
    ) -> Self {
        Self {
            drainer: Arc::new(Drainer {
                sources,
                sink,
                logger,
                reported: Mutex::default(),
            }),
            interval: POLL_INTERVAL,
            state: Mutex::new(PollerState::Idle),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), PollerState::Running { .. })
    }

    /// Reset the sources' diagnostics and spawn the polling loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), PollerError> {
        let mut state = self.state.lock();
        match *state {
            PollerState::Running { .. } => return Err(PollerError::AlreadyRunning),
            PollerState::Stopped => return Err(PollerError::AlreadyStopped),
            PollerState::Idle => {}
        }

        self.drainer.reset();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            Arc::clone(&self.drainer),
            self.interval,
            cancel.clone(),
        ));
        info!(
            sources = self.drainer.sources.len(),
            interval_ms = self.interval.as_millis() as u64,
            "health poller started"
        );
        *state = PollerState::Running { cancel, task };
        Ok(())
    }

    /// Cancel the loop, wait for it, then drain one final time.
    pub async fn stop(&self) -> Result<(), PollerError> {
        let previous = std::mem::replace(&mut *self.state.lock(), PollerState::Stopped);
        match previous {
            PollerState::Stopped => return Err(PollerError::AlreadyStopped),
            PollerState::Idle => {}
            PollerState::Running { cancel, task } => {
                cancel.cancel();
                if let Err(e) = task.await {
                    warn!(error = %e, "health poller task ended abnormally");
                }
            }
        }
        self.drainer.drain();
        info!("health poller stopped");
        Ok(())
    }

    /// Clear every source's diagnostics and forget reported warnings.
    pub fn reset(&self) {
        self.drainer.reset();
    }
}

impl Drop for HealthPoller {
    fn drop(&mut self) {
        if let PollerState::Running { cancel, .. } = &*self.state.lock() {
            cancel.cancel();
        }
    }
}

async fn poll_loop(drainer: Arc<Drainer>, interval: Duration, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("health poller loop cancelled");
                break;
            }
            _ = tokio::time::sleep(interval) => drainer.drain(),
        }
    }
}
