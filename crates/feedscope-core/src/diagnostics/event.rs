//! Lifecycle events recorded for traced operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle stage of a traced operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl EventKind {
    /// Every kind except `Started` ends an operation.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Started)
    }
}

/// One immutable lifecycle event.
///
/// All events of one logical operation share a `tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub event_id: Uuid,
    pub tag: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub source: String,
    pub resource: String,
    pub operation: String,
}

impl DiagnosticEvent {
    /// Create an event stamped with the current time.
    pub fn new(
        kind: EventKind,
        tag: Uuid,
        source: impl Into<String>,
        resource: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self::at(Utc::now(), kind, tag, source, resource, operation)
    }

    /// Create an event with an explicit timestamp.
    pub fn at(
        timestamp: DateTime<Utc>,
        kind: EventKind,
        tag: Uuid,
        source: impl Into<String>,
        resource: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            tag,
            timestamp,
            kind,
            source: source.into(),
            resource: resource.into(),
            operation: operation.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_kinds() {
        assert!(!EventKind::Started.is_terminal());
        for kind in [
            EventKind::Completed,
            EventKind::Failed,
            EventKind::Cancelled,
            EventKind::TimedOut,
        ] {
            assert!(kind.is_terminal());
        }
    }

    #[test]
    fn test_events_get_unique_ids() {
        let tag = Uuid::new_v4();
        let a = DiagnosticEvent::new(EventKind::Started, tag, "nuget", "Res", "op");
        let b = DiagnosticEvent::new(EventKind::Completed, tag, "nuget", "Res", "op");
        assert_ne!(a.event_id, b.event_id);
        assert_eq!(a.tag, b.tag);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&EventKind::TimedOut).unwrap();
        assert_eq!(json, "\"timed_out\"");
    }
}
