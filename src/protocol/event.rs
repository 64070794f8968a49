//! Lifecycle event schema.
//!
//! One `start` and at most one `end` event is emitted per activation.
//! Events are immutable once built.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of callable an activation belongs to
///
/// **Public** - shared by instrumentor, sandbox and reconstructor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Declared functions, methods and named function literals
    Function,
    /// A scheduled callable without its own instrumentation
    Call,
    /// Function literal passed directly as an argument
    Callback,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Function => "function",
            EventKind::Call => "call",
            EventKind::Callback => "callback",
        }
    }

    /// Parse the label written into instrumented source
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "function" => Some(EventKind::Function),
            "call" => Some(EventKind::Call),
            "callback" => Some(EventKind::Callback),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Start,
    End,
}

/// Wire-level lifecycle event
///
/// **Public** - the `process-event` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    /// Activation id, unique within a run
    pub id: String,

    /// Display name of the callable
    pub name: String,

    pub kind: EventKind,

    pub phase: Phase,

    /// Activation that was on top of the stack at emission time
    #[serde(default)]
    pub parent_id: Option<String>,

    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl LifecycleEvent {
    /// Build a `start` event
    pub fn start(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: EventKind,
        parent_id: Option<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            phase: Phase::Start,
            parent_id,
            timestamp,
        }
    }

    /// Build an `end` event
    pub fn end(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: EventKind,
        parent_id: Option<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            phase: Phase::End,
            parent_id,
            timestamp,
        }
    }

    pub fn is_start(&self) -> bool {
        self.phase == Phase::Start
    }

    /// One-line debug annotation for the run's trace log
    ///
    /// `[trace] start tick#3 (callback) <- main#1`
    pub fn annotation(&self) -> String {
        let phase = match self.phase {
            Phase::Start => "start",
            Phase::End => "end",
        };
        match (&self.phase, &self.parent_id) {
            (Phase::Start, Some(parent)) => {
                format!("[trace] {} {} ({}) <- {}", phase, self.id, self.kind, parent)
            }
            _ => format!("[trace] {} {} ({})", phase, self.id, self.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let event = LifecycleEvent::start("main#1", "main", EventKind::Function, None, 42);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "main#1",
                "name": "main",
                "kind": "function",
                "phase": "start",
                "parentId": null,
                "timestamp": 42
            })
        );
    }

    #[test]
    fn test_missing_parent_defaults_to_none() {
        let event: LifecycleEvent = serde_json::from_value(json!({
            "id": "a#1", "name": "a", "kind": "callback", "phase": "end", "timestamp": 7
        }))
        .unwrap();
        assert_eq!(event.parent_id, None);
        assert_eq!(event.kind, EventKind::Callback);
        assert!(!event.is_start());
    }

    #[test]
    fn test_annotation() {
        let start = LifecycleEvent::start("tick#3", "tick", EventKind::Callback, Some("main#1".into()), 5);
        assert_eq!(start.annotation(), "[trace] start tick#3 (callback) <- main#1");

        let end = LifecycleEvent::end("tick#3", "tick", EventKind::Callback, Some("main#1".into()), 6);
        assert_eq!(end.annotation(), "[trace] end tick#3 (callback)");
    }
}
