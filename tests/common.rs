use std::sync::{Arc, Mutex, Once};

use route_devtools::bus::{DevtoolsState, Subscription};
use route_devtools::trace::{TraceEvent, TRACE_EVENT_TYPE};

/// Install a test subscriber once so `RUST_LOG=route_devtools=debug`
/// surfaces internal logging in failing tests.
#[allow(dead_code)]
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Collects every trace event published on a state's bus.
///
/// Keep the returned [`Subscription`] alive for as long as events should
/// be captured; dropping it unsubscribes.
#[allow(dead_code)]
pub fn capture_trace_events(
    state: &Arc<DevtoolsState>,
) -> (Arc<Mutex<Vec<TraceEvent>>>, Subscription) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let sub = state.bus().on(TRACE_EVENT_TYPE, move |envelope| {
        if let Some(event) = envelope.as_trace() {
            sink.lock().unwrap().push(event);
        }
    });
    (events, sub)
}

/// Poll until `cond` holds or the attempt budget runs out.
#[allow(dead_code)]
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
}
