//! Correlation of events into request records and health metrics.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::event::{DiagnosticEvent, EventKind};

/// Requests taking longer than this count as slow.
pub const SLOW_SOURCE_THRESHOLD: Duration = Duration::from_secs(5);

/// Incomplete requests older than this count as unresponsive.
pub const UNRESPONSIVE_SOURCE_THRESHOLD: Duration = Duration::from_secs(5);

/// Outcome of one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    Completed,
    Failed,
    Cancelled,
    TimedOut,
    /// No terminal event yet
    Incomplete,
}

/// All events sharing one tag, reduced to an outcome and a duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    pub tag: Uuid,
    pub outcome: RequestOutcome,
    pub duration: Duration,
}

/// Counts over a snapshot of request records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthMetrics {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub timed_out: usize,
    pub incomplete: usize,
    /// Successful or incomplete requests above the slow threshold
    pub slow: usize,
    /// Incomplete requests above the unresponsive threshold
    pub unresponsive: usize,
}

impl HealthMetrics {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a RequestRecord>) -> Self {
        records.into_iter().fold(Self::default(), |mut m, r| {
            m.total += 1;
            match r.outcome {
                RequestOutcome::Completed => {
                    m.successful += 1;
                    if r.duration > SLOW_SOURCE_THRESHOLD {
                        m.slow += 1;
                    }
                }
                RequestOutcome::Incomplete => {
                    m.incomplete += 1;
                    if r.duration > SLOW_SOURCE_THRESHOLD {
                        m.slow += 1;
                    }
                    if r.duration > UNRESPONSIVE_SOURCE_THRESHOLD {
                        m.unresponsive += 1;
                    }
                }
                RequestOutcome::Failed => m.failed += 1,
                RequestOutcome::Cancelled => m.cancelled += 1,
                RequestOutcome::TimedOut => m.timed_out += 1,
            }
            m
        })
    }
}

/// Group events by tag into request records.
///
/// The first terminal event of a tag decides its outcome. Relative order
/// across tags does not matter. Records come back in order of first
/// appearance.
pub fn correlate(events: &[DiagnosticEvent], reference_time: DateTime<Utc>) -> Vec<RequestRecord> {
    #[derive(Default)]
    struct Pending {
        started: Option<DateTime<Utc>>,
        terminal: Option<(EventKind, DateTime<Utc>)>,
    }

    let mut order = Vec::new();
    let mut by_tag: HashMap<Uuid, Pending> = HashMap::new();

    for event in events {
        let entry = by_tag.entry(event.tag).or_insert_with(|| {
            order.push(event.tag);
            Pending::default()
        });
        if event.kind.is_terminal() {
            entry.terminal.get_or_insert((event.kind, event.timestamp));
        } else {
            entry.started.get_or_insert(event.timestamp);
        }
    }

    order
        .into_iter()
        .filter_map(|tag| {
            let pending = by_tag.remove(&tag)?;
            let (outcome, end) = match pending.terminal {
                Some((kind, at)) => (outcome_of(kind), at),
                None => (RequestOutcome::Incomplete, reference_time),
            };
            let duration = pending
                .started
                .and_then(|start| (end - start).to_std().ok())
                .unwrap_or_default();
            Some(RequestRecord {
                tag,
                outcome,
                duration,
            })
        })
        .collect()
}

fn outcome_of(kind: EventKind) -> RequestOutcome {
    match kind {
        EventKind::Completed => RequestOutcome::Completed,
        EventKind::Failed => RequestOutcome::Failed,
        EventKind::Cancelled => RequestOutcome::Cancelled,
        EventKind::TimedOut => RequestOutcome::TimedOut,
        EventKind::Started => RequestOutcome::Incomplete,
    }
}

/// Compute metrics for an event snapshot.
pub fn compute_metrics(events: &[DiagnosticEvent], reference_time: DateTime<Utc>) -> HealthMetrics {
    HealthMetrics::from_records(&correlate(events, reference_time))
}

/// Human-readable rate: "None of N", "All of N" or "k/N".
pub fn format_rate(count: usize, total: usize) -> String {
    if count == 0 {
        format!("None of {total}")
    } else if count == total {
        format!("All of {total}")
    } else {
        format!("{count}/{total}")
    }
}

/// Short duration text used in messages, e.g. `5s`, `1m 30s`, `250ms`.
pub fn readable_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        return format!("{}ms", duration.as_millis());
    }
    let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);
    let mut parts = Vec::new();
    if h > 0 {
        parts.push(format!("{h}h"));
    }
    if m > 0 {
        parts.push(format!("{m}m"));
    }
    if s > 0 {
        parts.push(format!("{s}s"));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn event(kind: EventKind, tag: Uuid, at: DateTime<Utc>) -> DiagnosticEvent {
        DiagnosticEvent::at(at, kind, tag, "feed", "Resource", "op")
    }

    fn completed_after(base: DateTime<Utc>, millis: i64) -> Vec<DiagnosticEvent> {
        let tag = Uuid::new_v4();
        vec![
            event(EventKind::Started, tag, base),
            event(
                EventKind::Completed,
                tag,
                base + TimeDelta::milliseconds(millis),
            ),
        ]
    }

    #[test]
    fn test_completed_under_threshold_is_not_slow() {
        let now = Utc::now();
        let metrics = compute_metrics(&completed_after(now, 5000), now);
        assert_eq!(metrics.successful, 1);
        assert_eq!(metrics.slow, 0);
    }

    #[test]
    fn test_completed_over_threshold_is_slow() {
        let now = Utc::now();
        let metrics = compute_metrics(&completed_after(now, 5001), now);
        assert_eq!(metrics.successful, 1);
        assert_eq!(metrics.slow, 1);
    }

    #[test]
    fn test_incomplete_uses_reference_time() {
        let start = Utc::now();
        let tag = Uuid::new_v4();
        let events = vec![event(EventKind::Started, tag, start)];

        let early = correlate(&events, start + TimeDelta::seconds(2));
        assert_eq!(early[0].outcome, RequestOutcome::Incomplete);
        assert_eq!(early[0].duration, Duration::from_secs(2));

        let metrics = compute_metrics(&events, start + TimeDelta::seconds(2));
        assert_eq!(metrics.incomplete, 1);
        assert_eq!(metrics.unresponsive, 0);

        let metrics = compute_metrics(&events, start + TimeDelta::seconds(6));
        assert_eq!(metrics.unresponsive, 1);
        assert_eq!(metrics.slow, 1);
    }

    #[test]
    fn test_first_terminal_event_wins() {
        let now = Utc::now();
        let tag = Uuid::new_v4();
        let events = vec![
            event(EventKind::Started, tag, now),
            event(EventKind::Cancelled, tag, now + TimeDelta::seconds(1)),
            event(EventKind::Completed, tag, now + TimeDelta::seconds(2)),
        ];
        let metrics = compute_metrics(&events, now);
        assert_eq!(metrics.total, 1);
        assert_eq!(metrics.cancelled, 1);
        assert_eq!(metrics.successful, 0);
    }

    #[test]
    fn test_interleaved_tags_group_correctly() {
        let now = Utc::now();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let events = vec![
            event(EventKind::Started, a, now),
            event(EventKind::Started, b, now),
            event(EventKind::Failed, b, now + TimeDelta::seconds(1)),
            event(EventKind::TimedOut, a, now + TimeDelta::seconds(9)),
        ];
        let records = correlate(&events, now);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tag, a);
        assert_eq!(records[0].outcome, RequestOutcome::TimedOut);
        assert_eq!(records[1].outcome, RequestOutcome::Failed);

        let metrics = HealthMetrics::from_records(&records);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.timed_out, 1);
        assert_eq!(metrics.slow, 0);
    }

    #[test]
    fn test_metrics_are_idempotent() {
        let now = Utc::now();
        let events = completed_after(now, 7000);
        assert_eq!(compute_metrics(&events, now), compute_metrics(&events, now));
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(0, 4), "None of 4");
        assert_eq!(format_rate(4, 4), "All of 4");
        assert_eq!(format_rate(1, 4), "1/4");
    }

    #[test]
    fn test_readable_duration() {
        assert_eq!(readable_duration(SLOW_SOURCE_THRESHOLD), "5s");
        assert_eq!(readable_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(readable_duration(Duration::from_millis(250)), "250ms");
    }
}
