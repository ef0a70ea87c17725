//! Handler instrumentation runtime.
//!
//! [`invoke`] runs one route handler and emits its trace events: a start
//! event before the handler future is polled, then exactly one terminal,
//! either completion (with sanitized output) or abort. The handler's own
//! result always passes through untouched; errors are rethrown to the
//! framework exactly as the handler produced them, and a cancelled
//! invocation still drives the handler to completion so the framework sees
//! its real outcome.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::events::{epoch_millis, Envelope, HandlerKind, TraceEvent};
use super::sanitize::{sanitize, ToCaptured};
use crate::bus::DevtoolsState;

/// Request fields captured into the start event.
#[derive(Debug, Clone, Default)]
pub struct RequestSnapshot {
    pub method: String,
    pub url: String,
    pub headers: std::collections::BTreeMap<String, String>,
}

impl RequestSnapshot {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        RequestSnapshot {
            method: method.into(),
            url: url.into(),
            headers: Default::default(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A redirect extracted from a handler error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub status: u16,
    pub location: String,
}

/// How handler errors appear in the trace. Frameworks throw redirects as
/// errors; those are reported as redirects, everything else as a plain
/// error message. Classification never alters what is rethrown.
pub trait ClassifyError: Display {
    fn as_redirect(&self) -> Option<Redirect> {
        None
    }
}

/// Identity of one handler invocation.
#[derive(Debug, Clone)]
pub struct HandlerInvocation {
    pub route_id: String,
    pub kind: HandlerKind,
    pub request: RequestSnapshot,
    pub middleware_name: Option<String>,
    pub middleware_index: Option<u32>,
}

impl HandlerInvocation {
    pub fn new(route_id: impl Into<String>, kind: HandlerKind, request: RequestSnapshot) -> Self {
        HandlerInvocation {
            route_id: route_id.into(),
            kind,
            request,
            middleware_name: None,
            middleware_index: None,
        }
    }

    pub fn middleware(
        route_id: impl Into<String>,
        kind: HandlerKind,
        request: RequestSnapshot,
        index: u32,
        name: impl Into<String>,
    ) -> Self {
        HandlerInvocation {
            route_id: route_id.into(),
            kind,
            request,
            middleware_name: Some(name.into()),
            middleware_index: Some(index),
        }
    }

    /// Stable id shared by the start and terminal events. Combined with the
    /// millisecond start time it forms the correlation key, so identical
    /// handlers starting in the same millisecond collide; such invocations
    /// run untraced rather than corrupt another invocation's record.
    fn correlation_id(&self) -> String {
        match self.middleware_index {
            Some(index) => format!("{}:{}:{index}", self.route_id, self.kind.as_str()),
            None => format!("{}:{}", self.route_id, self.kind.as_str()),
        }
    }
}

/// Run a handler under tracing.
pub async fn invoke<F, T, E>(
    state: &Arc<DevtoolsState>,
    invocation: HandlerInvocation,
    cancel: Option<CancellationToken>,
    handler: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    T: ToCaptured,
    E: ClassifyError,
{
    let start_time = epoch_millis();
    let start = TraceEvent {
        id: invocation.correlation_id(),
        route_id: invocation.route_id,
        kind: invocation.kind,
        start_time,
        end_time: None,
        method: invocation.request.method,
        url: invocation.request.url,
        headers: invocation.request.headers,
        data: None,
        aborted: None,
        middleware_name: invocation.middleware_name,
        middleware_index: invocation.middleware_index,
    };
    let key = start.key();

    let tracked = state.begin_invocation(key.clone());
    if tracked {
        debug!(id = %key.id, kind = start.kind.as_str(), "handler start");
        state.publish(&Envelope::trace(&start));
    }

    tokio::pin!(handler);
    let outcome = match &cancel {
        Some(token) => {
            // Biased so an already-signalled token always wins over a
            // handler that is ready on its first poll.
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = handler.as_mut() => Some(result),
            }
        }
        None => Some(handler.as_mut().await),
    };

    match outcome {
        Some(result) => {
            if tracked && state.finish_invocation(&key) {
                let mut terminal = start;
                terminal.end_time = Some(epoch_millis());
                terminal.data = Some(match &result {
                    Ok(value) => sanitize(&value.to_captured()),
                    Err(err) => classify(err),
                });
                state.publish(&Envelope::trace(&terminal));
            }
            result
        }
        None => {
            if tracked && state.finish_invocation(&key) {
                let mut terminal = start;
                terminal.end_time = Some(epoch_millis());
                terminal.aborted = Some(true);
                state.publish(&Envelope::trace(&terminal));
            }
            debug!(id = %key.id, "invocation aborted, draining handler");
            // The abort already produced this invocation's terminal; the
            // remaining run is not traced.
            handler.as_mut().await
        }
    }
}

fn classify<E: ClassifyError>(err: &E) -> serde_json::Value {
    match err.as_redirect() {
        Some(redirect) => serde_json::json!({
            "redirect": { "status": redirect.status, "location": redirect.location },
        }),
        None => serde_json::json!({ "error": err.to_string() }),
    }
}
