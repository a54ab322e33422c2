//! # In-Memory Sockets
//!
//! A connected pair of [`MemorySocket`]s, one per side, joined by two
//! unbounded channels. Each side runs a pump task that dispatches inbound
//! frames to the handlers registered with [`Socket::on`], in arrival order.
//!
//! ```text
//!   client side                          server side
//! ┌──────────────┐   Frame / Close   ┌──────────────┐
//! │ MemorySocket │ ────────────────→ │  pump task   │ → handlers
//! │              │ ←──────────────── │ MemorySocket │
//! └──────────────┘                   └──────────────┘
//! ```
//!
//! Closing either side (explicitly or by dropping it) runs the disconnect
//! handlers on both sides exactly once.

use super::{Ack, DisconnectHandler, FrameHandler, Socket, SocketTable, TransportError};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use wamp_types::SocketId;

enum Wire {
    Frame {
        event: String,
        payload: Value,
        ack: Option<Ack>,
    },
    Close,
}

/// State owned by one side of the connection.
struct Endpoint {
    id: SocketId,
    handlers: RwLock<HashMap<String, Vec<FrameHandler>>>,
    disconnect_handlers: Mutex<Vec<DisconnectHandler>>,
    connected: AtomicBool,
}

impl Endpoint {
    fn new(id: SocketId) -> Arc<Self> {
        Arc::new(Self {
            id,
            handlers: RwLock::new(HashMap::new()),
            disconnect_handlers: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        })
    }

    fn dispatch(&self, event: &str, payload: Value, ack: Option<Ack>) {
        // Clone out so handlers may register further handlers.
        let handlers = self.handlers.read().get(event).cloned().unwrap_or_default();
        if handlers.is_empty() {
            trace!(socket_id = %self.id, event, "No handler for frame");
            return;
        }

        let mut ack = ack;
        for handler in handlers {
            handler(payload.clone(), ack.take());
        }
    }

    /// Queue `handler` for close, or run it now if already closed.
    fn add_disconnect_handler(&self, handler: DisconnectHandler) {
        {
            let mut handlers = self.disconnect_handlers.lock();
            if self.connected.load(Ordering::Acquire) {
                handlers.push(handler);
                return;
            }
        }
        handler(self.id.clone());
    }

    /// Flip to disconnected. Returns false if already disconnected.
    fn close(&self) -> bool {
        // The flag flips under the handler lock so a concurrent
        // `on_disconnect` either lands in the drained list or sees the flag.
        let pending: Vec<DisconnectHandler> = {
            let mut handlers = self.disconnect_handlers.lock();
            if !self.connected.swap(false, Ordering::AcqRel) {
                return false;
            }
            handlers.drain(..).collect()
        };
        for handler in pending {
            handler(self.id.clone());
        }
        // Handlers may capture this socket; drop them to break the cycle.
        self.handlers.write().clear();
        debug!(socket_id = %self.id, "Socket disconnected");
        true
    }
}

/// One side of an in-memory connection.
pub struct MemorySocket {
    local: Arc<Endpoint>,
    peer_tx: mpsc::UnboundedSender<Wire>,
    frames_sent: AtomicU64,
}

impl MemorySocket {
    /// Close the connection from this side.
    pub fn disconnect(&self) {
        if self.local.close() {
            let _ = self.peer_tx.send(Wire::Close);
        }
    }

    /// Frames successfully handed to the peer.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }
}

impl Drop for MemorySocket {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Socket for MemorySocket {
    fn id(&self) -> &SocketId {
        &self.local.id
    }

    fn on(&self, event: &str, handler: FrameHandler) {
        self.local
            .handlers
            .write()
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }

    fn on_disconnect(&self, handler: DisconnectHandler) {
        self.local.add_disconnect_handler(handler);
    }

    fn emit(&self, event: &str, payload: Value, ack: Option<Ack>) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected(self.local.id.clone()));
        }
        self.peer_tx
            .send(Wire::Frame {
                event: event.to_string(),
                payload,
                ack,
            })
            .map_err(|_| TransportError::Disconnected(self.local.id.clone()))?;
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.local.connected.load(Ordering::Acquire)
    }
}

async fn pump(endpoint: Arc<Endpoint>, mut inbound: mpsc::UnboundedReceiver<Wire>) {
    while let Some(wire) = inbound.recv().await {
        match wire {
            Wire::Frame { event, payload, ack } => endpoint.dispatch(&event, payload, ack),
            Wire::Close => break,
        }
    }
    endpoint.close();
}

/// Create a connected pair `(client, server)` sharing one socket id.
///
/// Must be called inside a tokio runtime: each side spawns its pump task.
pub fn pair(id: SocketId) -> (Arc<MemorySocket>, Arc<MemorySocket>) {
    let (to_server, server_rx) = mpsc::unbounded_channel();
    let (to_client, client_rx) = mpsc::unbounded_channel();

    let client_end = Endpoint::new(id.clone());
    let server_end = Endpoint::new(id);

    tokio::spawn(pump(client_end.clone(), client_rx));
    tokio::spawn(pump(server_end.clone(), server_rx));

    let client = Arc::new(MemorySocket {
        local: client_end,
        peer_tx: to_server,
        frames_sent: AtomicU64::new(0),
    });
    let server = Arc::new(MemorySocket {
        local: server_end,
        peer_tx: to_client,
        frames_sent: AtomicU64::new(0),
    });
    (client, server)
}

/// Accepts in-memory connections and tracks the server sides.
#[derive(Debug, Clone, Default)]
pub struct MemoryServer {
    table: SocketTable,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live table of server-side sockets.
    pub fn table(&self) -> &SocketTable {
        &self.table
    }

    /// Open a connection. The server side stays in the table until it
    /// disconnects.
    pub fn connect(&self) -> (Arc<MemorySocket>, Arc<MemorySocket>) {
        let (client, server) = pair(SocketId::generate());
        self.table.insert(server.clone());

        let table = self.table.clone();
        server.on_disconnect(Box::new(move |socket_id| {
            table.remove(&socket_id);
        }));

        debug!(socket_id = %server.id(), "Accepted in-memory connection");
        (client, server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::oneshot;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_frames_reach_handler_in_order() {
        let (client, server) = pair(SocketId::from("s1"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        server.on(
            "ping",
            Arc::new(move |payload, _ack| sink.lock().push(payload)),
        );

        for n in 0..3 {
            client.emit("ping", json!(n), None).unwrap();
        }
        settle().await;

        assert_eq!(*seen.lock(), vec![json!(0), json!(1), json!(2)]);
        assert_eq!(client.frames_sent(), 3);
    }

    #[tokio::test]
    async fn test_ack_round_trip() {
        let (client, server) = pair(SocketId::from("s1"));
        server.on(
            "echo",
            Arc::new(|payload, ack| {
                if let Some(ack) = ack {
                    ack.send(payload);
                }
            }),
        );

        let (tx, rx) = oneshot::channel();
        client
            .emit("echo", json!({"a": 1}), Some(Ack::new(move |v| {
                let _ = tx.send(v);
            })))
            .unwrap();

        assert_eq!(rx.await.unwrap(), json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_unhandled_frame_drops_ack() {
        let (client, _server) = pair(SocketId::from("s1"));
        let (tx, rx) = oneshot::channel::<Value>();
        client
            .emit("nobody", json!(null), Some(Ack::new(move |v| {
                let _ = tx.send(v);
            })))
            .unwrap();

        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_disconnect_runs_handlers_on_both_sides() {
        let (client, server) = pair(SocketId::from("s1"));
        let (tx, rx) = oneshot::channel();
        server.on_disconnect(Box::new(move |id| {
            let _ = tx.send(id);
        }));

        client.disconnect();
        assert!(!client.is_connected());
        assert_eq!(rx.await.unwrap(), SocketId::from("s1"));
        assert!(!server.is_connected());
        assert!(matches!(
            client.emit("ping", json!(1), None),
            Err(TransportError::Disconnected(_))
        ));
    }

    #[test]
    fn test_disconnect_handler_racing_close_runs_once() {
        for _ in 0..2_000 {
            let endpoint = Endpoint::new(SocketId::from("s1"));
            let runs = Arc::new(AtomicU64::new(0));

            let registering = {
                let endpoint = endpoint.clone();
                let runs = runs.clone();
                std::thread::spawn(move || {
                    endpoint.add_disconnect_handler(Box::new(move |_| {
                        runs.fetch_add(1, Ordering::SeqCst);
                    }));
                })
            };
            let closing = {
                let endpoint = endpoint.clone();
                std::thread::spawn(move || endpoint.close())
            };
            registering.join().unwrap();
            assert!(closing.join().unwrap());

            assert_eq!(runs.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_server_table_tracks_connections() {
        let server = MemoryServer::new();
        let (client, server_side) = server.connect();
        assert!(server.table().contains(server_side.id()));

        drop(client);
        settle().await;
        assert!(server.table().is_empty());
    }
}
