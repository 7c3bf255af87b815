//! Source health diagnostics.
//!
//! Every traced operation appends a `Started` event and one terminal event
//! sharing a correlation tag. Metrics are computed on demand from a
//! snapshot of the log and turned into classified messages:
//! - slow: requests above 5s
//! - unreliable: cancelled or failed requests
//! - unresponsive: requests still running after 5s, or timed out

mod event;
mod hub;
mod message;
pub mod metrics;
mod store;

pub use event::{DiagnosticEvent, EventKind};
pub use hub::DiagnosticsHub;
pub use message::{DiagnosticMessage, SourceStatus, format_warning, messages_for};
pub use metrics::{
    HealthMetrics, RequestOutcome, RequestRecord, SLOW_SOURCE_THRESHOLD,
    UNRESPONSIVE_SOURCE_THRESHOLD, compute_metrics, format_rate,
};
pub use store::{SourceDiagnostics, TracedError};
