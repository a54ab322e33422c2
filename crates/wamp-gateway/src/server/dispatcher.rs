//! # Request Dispatcher
//!
//! Binds sockets to an [`EndpointRegistry`] and routes their inbound frames.
//!
//! ```text
//!  rpc-request frame ──→ validate ──→ hook.intercept ──→ resolve(procedure)
//!                            │                              │
//!                         (drop)            ┌───────────────┼──────────────┐
//!                                           ▼               ▼              ▼
//!                                    rpc(data, responder) event(data)  hook.unhandled
//! ```
//!
//! Frames that fail validation are dropped and only debug-logged. The
//! [`RequestHook`] decides what happens to requests no endpoint serves; the
//! plain server answers them with a not-registered error listing the known
//! procedures.

use crate::registry::{Endpoint, EndpointRegistry, EventHandler, RpcHandler};
use crate::server::responder::Responder;
use crate::transport::{Ack, Socket};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};
use wamp_types::{
    MessageValidator, Request, RpcError, Shape, SocketId, StructuralValidator, RPC_REQUEST_EVENT,
};

/// Routing extension points of a [`WampServer`].
pub trait RequestHook: Send + Sync + 'static {
    /// Runs before the registry lookup.
    ///
    /// Return the pair to continue ordinary routing, or `None` once the hook
    /// has taken over the request.
    fn intercept(&self, request: Request, responder: Responder) -> Option<(Request, Responder)> {
        Some((request, responder))
    }

    /// No endpoint serves `request.procedure`. `error` lists the known ones.
    fn unhandled(&self, request: Request, responder: Responder, error: RpcError);
}

/// Answers unserved requests with the not-registered error.
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectUnregistered;

impl RequestHook for RejectUnregistered {
    fn unhandled(&self, request: Request, responder: Responder, error: RpcError) {
        debug!(procedure = %request.procedure, "Procedure not registered");
        responder.err(error);
    }
}

/// Server role: owns the endpoint registry and upgrades sockets.
pub struct WampServer<H = RejectUnregistered> {
    endpoints: RwLock<EndpointRegistry<Responder>>,
    validator: Arc<dyn MessageValidator>,
    upgraded: Mutex<HashSet<SocketId>>,
    hook: H,
}

impl WampServer<RejectUnregistered> {
    /// Plain server with the structural validator.
    pub fn new() -> Arc<Self> {
        Self::with_hook(Arc::new(StructuralValidator::new()), RejectUnregistered)
    }
}

impl<H: RequestHook> WampServer<H> {
    pub fn with_hook(validator: Arc<dyn MessageValidator>, hook: H) -> Arc<Self> {
        Arc::new(Self {
            endpoints: RwLock::new(EndpointRegistry::new()),
            validator,
            upgraded: Mutex::new(HashSet::new()),
            hook,
        })
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    pub fn register_rpc_endpoints<I, S>(&self, endpoints: I)
    where
        I: IntoIterator<Item = (S, RpcHandler<Responder>)>,
        S: Into<String>,
    {
        self.endpoints.write().register_rpc(endpoints);
    }

    pub fn register_event_endpoints<I, S>(&self, endpoints: I)
    where
        I: IntoIterator<Item = (S, EventHandler)>,
        S: Into<String>,
    {
        self.endpoints.write().register_events(endpoints);
    }

    pub fn reassign_rpc_endpoints<I, S>(&self, endpoints: I)
    where
        I: IntoIterator<Item = (S, RpcHandler<Responder>)>,
        S: Into<String>,
    {
        self.endpoints.write().reassign_rpc(endpoints);
    }

    pub fn reassign_event_endpoints<I, S>(&self, endpoints: I)
    where
        I: IntoIterator<Item = (S, EventHandler)>,
        S: Into<String>,
    {
        self.endpoints.write().reassign_events(endpoints);
    }

    /// No-op handlers for event names that have none.
    pub fn register_event_placeholders<I, S>(&self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoints.write().register_event_placeholders(names)
    }

    pub fn rpc_names(&self) -> Vec<String> {
        self.endpoints.read().rpc_names()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.endpoints.read().event_names()
    }

    pub fn is_upgraded(&self, socket_id: &SocketId) -> bool {
        self.upgraded.lock().contains(socket_id)
    }

    pub fn upgraded_count(&self) -> usize {
        self.upgraded.lock().len()
    }

    /// Attach the server to `socket`.
    ///
    /// Subscribes the socket to the RPC frame event and to every event name
    /// registered right now. Returns false if the socket was already
    /// upgraded, in which case nothing is attached twice.
    pub fn upgrade_socket(self: &Arc<Self>, socket: Arc<dyn Socket>) -> bool {
        let socket_id = socket.id().clone();
        if !self.upgraded.lock().insert(socket_id.clone()) {
            debug!(socket_id = %socket_id, "Socket already upgraded");
            return false;
        }

        // The transport releases handlers on close, which frees this clone.
        let frame_socket = Arc::clone(&socket);
        let server = Arc::clone(self);
        socket.on(
            RPC_REQUEST_EVENT,
            Arc::new(move |payload, ack| {
                server.handle_frame(Arc::clone(&frame_socket), payload, ack);
            }),
        );

        let events = self.event_names();
        for name in &events {
            let server = Arc::clone(self);
            let event = name.clone();
            socket.on(
                name,
                Arc::new(move |payload, _ack| server.handle_event(&event, payload)),
            );
        }

        let server = Arc::downgrade(self);
        socket.on_disconnect(Box::new(move |socket_id| {
            if let Some(server) = server.upgrade() {
                server.upgraded.lock().remove(&socket_id);
            }
        }));

        debug!(socket_id = %socket_id, events = events.len(), "Upgraded socket");
        true
    }

    /// Route one inbound RPC frame from `socket`.
    pub fn handle_frame(&self, socket: Arc<dyn Socket>, payload: Value, ack: Option<Ack>) {
        if !self.validator.validate(&payload, Shape::RpcRequest) {
            debug!(socket_id = %socket.id(), "Dropping malformed request frame");
            return;
        }

        let request: Request = match serde_json::from_value(payload) {
            Ok(request) => request,
            Err(e) => {
                debug!(socket_id = %socket.id(), error = %e, "Dropping undecodable request frame");
                return;
            }
        };

        let responder = Responder::new(socket, request.clone(), ack);
        self.dispatch(request, responder);
    }

    /// Route a decoded request.
    pub fn dispatch(&self, request: Request, responder: Responder) {
        let Some((request, responder)) = self.hook.intercept(request, responder) else {
            return;
        };

        // Resolve under the lock, invoke outside it.
        let endpoint = self.endpoints.read().resolve(&request.procedure);
        match endpoint {
            Some(Endpoint::Rpc(handler)) => {
                trace!(procedure = %request.procedure, "Dispatching rpc");
                handler(request.data, responder);
            }
            Some(Endpoint::Event(handler)) => {
                trace!(procedure = %request.procedure, "Dispatching event sent as rpc");
                handler(request.data);
            }
            None => {
                let known = self.endpoints.read().known_procedures();
                let error = RpcError::procedure_not_registered(&request.procedure, &known);
                self.hook.unhandled(request, responder, error);
            }
        }
    }

    fn handle_event(&self, name: &str, payload: Value) {
        let handler = self.endpoints.read().event(name);
        match handler {
            Some(handler) => handler(payload),
            None => trace!(event = name, "Event no longer registered"),
        }
    }
}
