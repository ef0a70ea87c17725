//! Intra-process event distribution and shared devtools state.
//!
//! [`EventBus`] is a synchronous pub/sub fanout: handlers run on the
//! emitting thread, in registration order, and unsubscribe by dropping
//! their [`Subscription`]. [`DevtoolsState`] ties the bus to the
//! aggregator, the socket hub, and the in-flight invocation set that
//! enforces one terminal event per invocation.

pub mod socket;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

use crate::aggregate::Aggregator;
use crate::trace::events::{Envelope, InvocationKey};
use socket::SocketHub;

type Handler = dyn Fn(&Envelope) + Send + Sync;

#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<String, Vec<(u64, Arc<Handler>)>>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(EventBus::default())
    }

    /// Register a handler for one envelope type. The handler runs until
    /// the returned subscription is dropped.
    pub fn on<F>(self: &Arc<Self>, event_type: &str, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .lock()
            .unwrap()
            .entry(event_type.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            bus: Arc::downgrade(self),
            event_type: event_type.to_string(),
            id,
        }
    }

    /// Deliver an envelope to every handler registered for its type, in
    /// registration order. The handler list is cloned out of the lock so
    /// handlers may themselves subscribe or emit.
    pub fn emit(&self, envelope: &Envelope) {
        let handlers: Vec<Arc<Handler>> = {
            let map = self.handlers.lock().unwrap();
            match map.get(&envelope.event_type) {
                Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
                None => return,
            }
        };
        for handler in handlers {
            handler(envelope);
        }
    }

    fn unsubscribe(&self, event_type: &str, id: u64) {
        let mut map = self.handlers.lock().unwrap();
        if let Some(list) = map.get_mut(event_type) {
            list.retain(|(entry_id, _)| *entry_id != id);
            if list.is_empty() {
                map.remove(event_type);
            }
        }
    }
}

/// Handle for one bus registration; dropping it unsubscribes.
pub struct Subscription {
    bus: Weak<EventBus>,
    event_type: String,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(&self.event_type, self.id);
        }
    }
}

/// Process-wide devtools state shared by the wrapper runtime and the
/// socket transport.
pub struct DevtoolsState {
    bus: Arc<EventBus>,
    aggregator: Mutex<Aggregator>,
    inflight: Mutex<HashSet<InvocationKey>>,
    sockets: SocketHub,
}

impl DevtoolsState {
    pub fn new() -> Arc<Self> {
        Arc::new(DevtoolsState {
            bus: EventBus::new(),
            aggregator: Mutex::new(Aggregator::new()),
            inflight: Mutex::new(HashSet::new()),
            sockets: SocketHub::new(),
        })
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn sockets(&self) -> &SocketHub {
        &self.sockets
    }

    /// Register an invocation as in flight. Returns false when the key is
    /// already live, which only happens on a correlation-key collision.
    pub fn begin_invocation(&self, key: InvocationKey) -> bool {
        let inserted = self.inflight.lock().unwrap().insert(key.clone());
        if !inserted {
            debug!(id = %key.id, start_time = key.start_time, "invocation key collision");
        }
        inserted
    }

    /// Claim the right to emit the terminal event for an invocation.
    /// Exactly one caller per key gets `true`; completion racing an abort
    /// resolves here.
    pub fn finish_invocation(&self, key: &InvocationKey) -> bool {
        self.inflight.lock().unwrap().remove(key)
    }

    /// Fold into the aggregator and fan out to bus subscribers.
    pub fn publish_local(&self, envelope: &Envelope) {
        self.aggregator.lock().unwrap().apply(envelope);
        self.bus.emit(envelope);
    }

    /// Publish locally and broadcast to connected sockets.
    pub fn publish(&self, envelope: &Envelope) {
        self.publish_local(envelope);
        self.sockets.broadcast(envelope);
    }

    /// Entry point for envelopes arriving over a socket; they feed the
    /// local aggregate and bus but are not echoed back out.
    pub fn dispatch_inbound(&self, envelope: &Envelope) {
        self.publish_local(envelope);
    }

    pub fn with_aggregator<R>(&self, f: impl FnOnce(&Aggregator) -> R) -> R {
        f(&self.aggregator.lock().unwrap())
    }

    pub fn snapshot(&self) -> serde_json::Value {
        self.aggregator.lock().unwrap().snapshot()
    }

    /// Clear aggregate state and the in-flight set. Live invocations lose
    /// their terminal claim; their results are intentionally dropped.
    pub fn reset(&self) {
        self.aggregator.lock().unwrap().reset();
        self.inflight.lock().unwrap().clear();
    }
}
