//! Classified health messages derived from metrics.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::metrics::{HealthMetrics, SLOW_SOURCE_THRESHOLD, format_rate, readable_duration};

/// Health classification of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    SlowSource,
    UnreliableSource,
    UnresponsiveSource,
    UnavailableSource,
}

impl SourceStatus {
    /// Sentence appended to user-facing warnings.
    pub fn warning_text(self) -> &'static str {
        match self {
            Self::SlowSource => "Source is slow.",
            Self::UnreliableSource => "Source is not reliable.",
            Self::UnresponsiveSource => "Source is not responsive.",
            Self::UnavailableSource => "Source is not available.",
        }
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SlowSource => "slow",
            Self::UnreliableSource => "unreliable",
            Self::UnresponsiveSource => "unresponsive",
            Self::UnavailableSource => "unavailable",
        };
        f.write_str(name)
    }
}

/// A classified observation about one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticMessage {
    pub source: String,
    pub status: SourceStatus,
    pub details: String,
}

impl DiagnosticMessage {
    /// Warning shown to users: "{name} performance warning. {status text}"
    pub fn warning(&self) -> String {
        format_warning(&self.source, self.status)
    }
}

pub fn format_warning(source: &str, status: SourceStatus) -> String {
    format!("{source} performance warning. {}", status.warning_text())
}

/// Build the messages for one source's metrics. Empty metrics yield none.
pub fn messages_for(source: &str, metrics: &HealthMetrics) -> Vec<DiagnosticMessage> {
    if metrics.is_empty() {
        return Vec::new();
    }

    let total = metrics.total;
    let message = |status, count, tail: &str| DiagnosticMessage {
        source: source.to_string(),
        status,
        details: format!(
            "[{source}] {} of source requests {tail}",
            format_rate(count, total)
        ),
    };

    let slow_tail = format!(
        "took more than {}.",
        readable_duration(SLOW_SOURCE_THRESHOLD)
    );
    let checks: [(usize, SourceStatus, &str); 5] = [
        (metrics.slow, SourceStatus::SlowSource, &slow_tail),
        (
            metrics.cancelled,
            SourceStatus::UnreliableSource,
            "were cancelled.",
        ),
        (metrics.failed, SourceStatus::UnreliableSource, "failed."),
        (
            metrics.unresponsive,
            SourceStatus::UnresponsiveSource,
            "are not responding.",
        ),
        (
            metrics.timed_out,
            SourceStatus::UnresponsiveSource,
            "timed out.",
        ),
    ];

    checks
        .into_iter()
        .filter(|(count, _, _)| *count > 0)
        .map(|(count, status, tail)| message(status, count, tail))
        .collect()
}
