//! Wire-level trace event types.
//!
//! A `TraceEvent` describes one invocation of an instrumented handler. It
//! is created at invocation start (no `endTime`), and the transport later
//! carries exactly one terminal message for the same invocation key adding
//! `endTime`/`data` or `aborted`. The JSON schema is camelCase and events
//! travel inside a `{ type, payload }` envelope.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Envelope type for handler trace events.
pub const TRACE_EVENT_TYPE: &str = "traceEvent";

/// Envelope types that feed the timeline rather than per-route stats.
pub const TIMELINE_TYPES: &[&str] = &["navigation", "submission", "revalidation"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HandlerKind {
    Loader,
    Action,
    ClientLoader,
    ClientAction,
    Middleware,
    ClientMiddleware,
    Custom,
}

impl HandlerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HandlerKind::Loader => "loader",
            HandlerKind::Action => "action",
            HandlerKind::ClientLoader => "clientLoader",
            HandlerKind::ClientAction => "clientAction",
            HandlerKind::Middleware => "middleware",
            HandlerKind::ClientMiddleware => "clientMiddleware",
            HandlerKind::Custom => "custom",
        }
    }
}

/// Correlation key for one invocation.
///
/// Millisecond timestamp resolution means two invocations of the same
/// route starting in the same millisecond with the same id can collide;
/// this is a documented limitation of the protocol, not silently patched
/// here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvocationKey {
    pub id: String,
    pub start_time: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEvent {
    pub id: String,
    pub route_id: String,
    pub kind: HandlerKind,
    /// Epoch milliseconds.
    pub start_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middleware_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middleware_index: Option<u32>,
}

impl TraceEvent {
    pub fn key(&self) -> InvocationKey {
        InvocationKey {
            id: self.id.clone(),
            start_time: self.start_time,
        }
    }

    /// True once the event carries an end or an abort; a single invocation
    /// key never produces both.
    pub fn is_terminal(&self) -> bool {
        self.end_time.is_some() || self.aborted == Some(true)
    }

    pub fn execution_time(&self) -> Option<u64> {
        self.end_time.map(|end| end.saturating_sub(self.start_time))
    }
}

/// Transport envelope: `{ type, payload }`. The payload is kept as raw
/// JSON so timeline-class events (navigations, submissions) share the
/// same framing as handler trace events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn trace(event: &TraceEvent) -> Self {
        Envelope {
            event_type: TRACE_EVENT_TYPE.to_string(),
            payload: serde_json::to_value(event).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn is_timeline(&self) -> bool {
        TIMELINE_TYPES.contains(&self.event_type.as_str())
    }

    pub fn as_trace(&self) -> Option<TraceEvent> {
        if self.event_type == TRACE_EVENT_TYPE {
            serde_json::from_value(self.payload.clone()).ok()
        } else {
            None
        }
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_event() -> TraceEvent {
        TraceEvent {
            id: "inv-1".to_string(),
            route_id: "routes/index".to_string(),
            kind: HandlerKind::Loader,
            start_time: 1_700_000_000_000,
            end_time: None,
            method: "GET".to_string(),
            url: "/".to_string(),
            headers: BTreeMap::new(),
            data: None,
            aborted: None,
            middleware_name: None,
            middleware_index: None,
        }
    }

    #[test]
    fn test_start_event_not_terminal() {
        assert!(!start_event().is_terminal());
    }

    #[test]
    fn test_completion_and_abort_are_terminal() {
        let mut done = start_event();
        done.end_time = Some(done.start_time + 12);
        assert!(done.is_terminal());
        assert_eq!(done.execution_time(), Some(12));

        let mut aborted = start_event();
        aborted.aborted = Some(true);
        aborted.end_time = Some(aborted.start_time + 5);
        assert!(aborted.is_terminal());
    }

    #[test]
    fn test_wire_schema_is_camel_case() {
        let json = serde_json::to_value(start_event()).unwrap();
        assert_eq!(json["routeId"], "routes/index");
        assert_eq!(json["kind"], "loader");
        assert_eq!(json["startTime"], 1_700_000_000_000u64);
        // Optional fields are omitted until set.
        assert!(json.get("endTime").is_none());
        assert!(json.get("aborted").is_none());
    }

    #[test]
    fn test_envelope_round_trip() {
        let env = Envelope::trace(&start_event());
        let wire = serde_json::to_string(&env).unwrap();
        assert!(wire.contains("\"type\":\"traceEvent\""));
        let back: Envelope = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.as_trace().unwrap(), start_event());
    }

    #[test]
    fn test_timeline_classification() {
        let nav = Envelope {
            event_type: "navigation".to_string(),
            payload: serde_json::json!({ "to": "/users" }),
        };
        assert!(nav.is_timeline());
        assert!(nav.as_trace().is_none());
        assert!(!Envelope::trace(&start_event()).is_timeline());
    }
}
