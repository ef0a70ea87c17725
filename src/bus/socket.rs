//! WebSocket transport for the trace event stream.
//!
//! Each connection gets a bounded outbound queue drained by its own send
//! task. Broadcast serializes an envelope once and `try_send`s it to every
//! queue: a full queue skips that event for that client (a stalled viewer
//! must not block handlers), a closed queue retires the connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::DevtoolsState;
use crate::trace::events::Envelope;

/// Well-known endpoint the browser client connects to.
pub const SOCKET_PATH: &str = "/__route-devtools/socket";

/// Outbound events buffered per connection before events are skipped.
const SEND_QUEUE_CAP: usize = 256;

/// Envelope type of the greeting sent to a newly connected client.
pub const SNAPSHOT_TYPE: &str = "snapshot";

struct Connection {
    id: u64,
    tx: mpsc::Sender<String>,
}

/// Registry of live socket connections.
#[derive(Default)]
pub struct SocketHub {
    connections: Mutex<Vec<Connection>>,
    next_id: AtomicU64,
}

impl SocketHub {
    pub fn new() -> Self {
        SocketHub::default()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    fn register(&self, tx: mpsc::Sender<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.lock().unwrap().push(Connection { id, tx });
        debug!(connection = id, "devtools socket registered");
        id
    }

    fn deregister(&self, id: u64) {
        self.connections.lock().unwrap().retain(|c| c.id != id);
        debug!(connection = id, "devtools socket closed");
    }

    /// Fan an envelope out to every connection.
    pub fn broadcast(&self, envelope: &Envelope) {
        let text = match serde_json::to_string(envelope) {
            Ok(text) => text,
            Err(err) => {
                warn!(%err, "unserializable envelope dropped");
                return;
            }
        };
        let mut connections = self.connections.lock().unwrap();
        connections.retain(|conn| match conn.tx.try_send(text.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(connection = conn.id, "send queue full, event skipped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

/// Router exposing the devtools socket endpoint; merge it into the host
/// application's router.
pub fn router(state: Arc<DevtoolsState>) -> Router {
    Router::new()
        .route(SOCKET_PATH, get(upgrade_handler))
        .with_state(state)
}

async fn upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<DevtoolsState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<DevtoolsState>) {
    let (tx, mut rx) = mpsc::channel::<String>(SEND_QUEUE_CAP);
    let id = state.sockets().register(tx.clone());
    let (mut sink, mut stream) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Late joiners start from the current aggregate instead of an empty
    // panel.
    let greeting = Envelope {
        event_type: SNAPSHOT_TYPE.to_string(),
        payload: state.snapshot(),
    };
    if let Ok(text) = serde_json::to_string(&greeting) {
        let _ = tx.send(text).await;
    }

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<Envelope>(text.as_str()) {
                Ok(envelope) => state.dispatch_inbound(&envelope),
                Err(err) => {
                    warn!(connection = id, %err, "malformed devtools message ignored");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(connection = id, %err, "devtools socket read failed");
                break;
            }
        }
    }

    state.sockets().deregister(id);
    send_task.abort();
}
