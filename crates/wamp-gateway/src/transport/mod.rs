//! Socket transport seam.
//!
//! The gateway only needs three things from a socket library: subscribe a
//! handler to an event name, emit a payload (optionally asking for an
//! acknowledgement) and learn when the connection goes away. [`Socket`]
//! captures exactly that; [`memory`] provides an in-process implementation.

pub mod memory;

use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use wamp_types::SocketId;

pub use memory::{MemoryServer, MemorySocket};

/// Acknowledgement callback travelling with an emitted frame.
///
/// Consumed on use, so a frame is acknowledged at most once. Dropping an
/// `Ack` without sending tells the emitter no answer will come.
pub struct Ack {
    callback: Box<dyn FnOnce(Value) + Send + 'static>,
}

impl Ack {
    pub fn new(callback: impl FnOnce(Value) + Send + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Deliver the acknowledgement payload to the emitter.
    pub fn send(self, payload: Value) {
        (self.callback)(payload)
    }
}

impl fmt::Debug for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Ack")
    }
}

/// Handler for frames arriving under one event name.
pub type FrameHandler = Arc<dyn Fn(Value, Option<Ack>) + Send + Sync>;

/// Invoked once when the connection closes.
pub type DisconnectHandler = Box<dyn FnOnce(SocketId) + Send>;

/// Transport errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("socket {0} is disconnected")]
    Disconnected(SocketId),
}

/// A connected, bidirectional socket.
pub trait Socket: Send + Sync {
    /// Stable per-connection identifier.
    fn id(&self) -> &SocketId;

    /// Subscribe `handler` to frames emitted by the peer under `event`.
    ///
    /// Handlers are released when the connection closes.
    fn on(&self, event: &str, handler: FrameHandler);

    /// Run `handler` once when the connection closes.
    fn on_disconnect(&self, handler: DisconnectHandler);

    /// Send a frame to the peer. `ack` is invoked with the peer's answer.
    fn emit(&self, event: &str, payload: Value, ack: Option<Ack>) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;
}

/// Live table of connected sockets, keyed by socket id.
#[derive(Clone, Default)]
pub struct SocketTable {
    sockets: Arc<DashMap<SocketId, Arc<dyn Socket>>>,
}

impl SocketTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, socket: Arc<dyn Socket>) {
        self.sockets.insert(socket.id().clone(), socket);
    }

    pub fn remove(&self, socket_id: &SocketId) -> Option<Arc<dyn Socket>> {
        self.sockets.remove(socket_id).map(|(_, socket)| socket)
    }

    pub fn get(&self, socket_id: &SocketId) -> Option<Arc<dyn Socket>> {
        self.sockets.get(socket_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, socket_id: &SocketId) -> bool {
        self.sockets.contains_key(socket_id)
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }
}

impl fmt::Debug for SocketTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketTable")
            .field("connected", &self.sockets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_ack_delivers_payload_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let ack = Ack::new(move |v| sink.lock().unwrap().push(v));
        ack.send(serde_json::json!(1));
        assert_eq!(*seen.lock().unwrap(), vec![serde_json::json!(1)]);
    }

    #[tokio::test]
    async fn test_socket_table() {
        let (_client, server) = memory::pair(SocketId::from("s1"));
        let table = SocketTable::new();
        table.insert(server);

        assert!(table.contains(&SocketId::from("s1")));
        assert_eq!(table.len(), 1);
        assert!(table.get(&SocketId::from("s1")).is_some());
        assert!(table.remove(&SocketId::from("s1")).is_some());
        assert!(table.is_empty());
    }
}
