//! # Worker Delegation
//!
//! A worker serves client sockets. Procedures it has no endpoint for are
//! forwarded to the master, and the answer is routed back to the socket and
//! the exact call that asked.
//!
//! ```text
//!  client ──rpc-request──→ WampServer ──(unhandled)──→ ForwardToMaster
//!                                                          │ record(socket, procedure, signature)
//!                                                          ▼
//!                                                   [ CallLedger ] ──→ MasterChannel
//!                                                          ▲                 │
//!  client ←──ack / rpc-response── Responder ←── complete(key) ←── interProcessRpcResponse
//! ```
//!
//! Master traffic is classified in a fixed order:
//! 1. master or plain RPC responses addressed to a socket are replayed
//!    through that socket's responder path (a missing socket is an error);
//! 2. inter-process responses complete their ledger entry, or are dropped;
//! 3. configuration pushes are merged and their event names get
//!    placeholder endpoints;
//! 4. everything else is ignored.

use crate::delegation::config_sync::ConfigSync;
use crate::domain::config::GatewayConfig;
use crate::domain::error::DelegationError;
use crate::domain::ledger::{self, CallKey, CallLedger, ResponseCallback};
use crate::registry::{EventHandler, RpcHandler};
use crate::server::{RequestHook, Responder, WampServer};
use crate::transport::{Socket, SocketTable};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use wamp_bus::{MasterChannel, MasterMessageSource};
use wamp_types::{
    ConfigPush, ConfigRequest, EnvelopeError, MessageKind, MessageValidator, Request, Response,
    RpcError, Shape, Signature, SocketId, StructuralValidator, WorkerId,
};

/// Worker-local procedure: receives the whole stamped request.
pub type WorkerRpcHandler = Arc<dyn Fn(Request, Responder) + Send + Sync>;

/// Wrap a closure as a [`WorkerRpcHandler`].
pub fn worker_rpc_handler<F>(handler: F) -> WorkerRpcHandler
where
    F: Fn(Request, Responder) + Send + Sync + 'static,
{
    Arc::new(handler)
}

/// What a master message turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterOutcome {
    /// Replayed to a client socket.
    Delivered { socket_id: SocketId },
    /// Answered the in-flight call at this key.
    Completed(CallKey),
    /// Matched no in-flight call.
    Dropped(CallKey),
    /// Configuration applied.
    Configured { version: u64 },
    Ignored,
}

/// State shared by the worker and its forwarding hook.
struct Delegation {
    worker_id: WorkerId,
    channel: Arc<dyn MasterChannel>,
    ledger: Arc<CallLedger>,
    worker_rpc: RwLock<HashMap<String, WorkerRpcHandler>>,
}

impl Delegation {
    fn send_to_master(
        &self,
        procedure: &str,
        data: Value,
        socket_id: &SocketId,
        callback: ResponseCallback,
    ) -> Result<Signature, DelegationError> {
        let normalized = if procedure.is_empty() {
            Err(EnvelopeError::InvalidProcedure(procedure.to_string()))
        } else if socket_id.is_empty() {
            Err(EnvelopeError::InvalidSocketId(Some(socket_id.to_string())))
        } else {
            Ok(())
        };
        if let Err(err) = normalized {
            callback(Err(RpcError::invalid_request(err.to_string())));
            return Err(err.into());
        }

        // Recorded before sending, so an answer can never outrun its entry.
        let key = self.ledger.record_new(socket_id, procedure, callback)?;

        if let Err(err) = self.emit_forward(&key, data) {
            if let Some(callback) = self.ledger.take(&key) {
                callback(Err(RpcError::connection_lost(err.to_string())));
            }
            warn!(call = %key, error = %err, "Failed to forward call to master");
            return Err(err);
        }

        debug!(
            socket_id = %key.socket_id,
            procedure = %key.procedure,
            signature = %key.signature,
            worker_id = %self.worker_id,
            "Forwarded call to master"
        );
        Ok(key.signature)
    }

    fn emit_forward(&self, key: &CallKey, data: Value) -> Result<(), DelegationError> {
        let request = Request::inter_process(
            key.procedure.clone(),
            data,
            key.socket_id.clone(),
            self.worker_id,
            key.signature.clone(),
        )?;
        self.channel.send_to_master(serde_json::to_value(&request)?)?;
        Ok(())
    }
}

/// [`RequestHook`] of a worker: worker-local endpoints first, forwarding
/// to the master last.
pub struct ForwardToMaster {
    delegation: Arc<Delegation>,
}

impl RequestHook for ForwardToMaster {
    fn intercept(&self, mut request: Request, responder: Responder) -> Option<(Request, Responder)> {
        request.socket_id = Some(responder.socket_id().clone());
        request.worker_id = Some(self.delegation.worker_id);

        let handler = self
            .delegation
            .worker_rpc
            .read()
            .get(&request.procedure)
            .cloned();
        match handler {
            Some(handler) => {
                trace!(procedure = %request.procedure, "Dispatching worker rpc");
                handler(request, responder);
                None
            }
            None => Some((request, responder)),
        }
    }

    fn unhandled(&self, request: Request, responder: Responder, _error: RpcError) {
        let socket_id = responder.socket_id().clone();
        let procedure = request.procedure;
        let callback: ResponseCallback = Box::new(move |result| {
            responder.respond(result);
        });

        if let Err(e) = self
            .delegation
            .send_to_master(&procedure, request.data, &socket_id, callback)
        {
            warn!(socket_id = %socket_id, procedure = %procedure, error = %e, "Call not forwarded");
        }
    }
}

/// Background tasks of a running worker.
#[derive(Debug)]
pub struct WorkerTasks {
    pub listener: JoinHandle<()>,
    pub sweeper: JoinHandle<()>,
}

impl WorkerTasks {
    pub fn abort(&self) {
        self.listener.abort();
        self.sweeper.abort();
    }
}

/// Worker role: a [`WampServer`] that forwards what it cannot serve.
pub struct WorkerServer {
    server: Arc<WampServer<ForwardToMaster>>,
    delegation: Arc<Delegation>,
    sockets: SocketTable,
    config: ConfigSync,
    validator: Arc<dyn MessageValidator>,
    sweep_interval: Duration,
}

impl WorkerServer {
    pub fn new(
        channel: Arc<dyn MasterChannel>,
        sockets: SocketTable,
        config: &GatewayConfig,
    ) -> Arc<Self> {
        Self::with_validator(channel, sockets, config, Arc::new(StructuralValidator::new()))
    }

    pub fn with_validator(
        channel: Arc<dyn MasterChannel>,
        sockets: SocketTable,
        config: &GatewayConfig,
        validator: Arc<dyn MessageValidator>,
    ) -> Arc<Self> {
        let delegation = Arc::new(Delegation {
            worker_id: channel.worker_id(),
            channel,
            ledger: Arc::new(CallLedger::new(config.ledger.entry_ttl())),
            worker_rpc: RwLock::new(HashMap::new()),
        });
        let server = WampServer::with_hook(
            Arc::clone(&validator),
            ForwardToMaster {
                delegation: Arc::clone(&delegation),
            },
        );

        Arc::new(Self {
            server,
            delegation,
            sockets,
            config: ConfigSync::new(),
            validator,
            sweep_interval: config.ledger.sweep_interval(),
        })
    }

    pub fn worker_id(&self) -> WorkerId {
        self.delegation.worker_id
    }

    pub fn server(&self) -> &Arc<WampServer<ForwardToMaster>> {
        &self.server
    }

    pub fn ledger(&self) -> &Arc<CallLedger> {
        &self.delegation.ledger
    }

    pub fn config(&self) -> &ConfigSync {
        &self.config
    }

    pub fn sockets(&self) -> &SocketTable {
        &self.sockets
    }

    pub fn register_rpc_endpoints<I, S>(&self, endpoints: I)
    where
        I: IntoIterator<Item = (S, RpcHandler<Responder>)>,
        S: Into<String>,
    {
        self.server.register_rpc_endpoints(endpoints);
    }

    pub fn register_event_endpoints<I, S>(&self, endpoints: I)
    where
        I: IntoIterator<Item = (S, EventHandler)>,
        S: Into<String>,
    {
        self.server.register_event_endpoints(endpoints);
    }

    pub fn reassign_rpc_endpoints<I, S>(&self, endpoints: I)
    where
        I: IntoIterator<Item = (S, RpcHandler<Responder>)>,
        S: Into<String>,
    {
        self.server.reassign_rpc_endpoints(endpoints);
    }

    pub fn reassign_event_endpoints<I, S>(&self, endpoints: I)
    where
        I: IntoIterator<Item = (S, EventHandler)>,
        S: Into<String>,
    {
        self.server.reassign_event_endpoints(endpoints);
    }

    /// Merge worker-local procedures, which see the full stamped request.
    pub fn register_worker_rpc_endpoints<I, S>(&self, endpoints: I)
    where
        I: IntoIterator<Item = (S, WorkerRpcHandler)>,
        S: Into<String>,
    {
        self.delegation
            .worker_rpc
            .write()
            .extend(endpoints.into_iter().map(|(name, h)| (name.into(), h)));
    }

    pub fn reassign_worker_rpc_endpoints<I, S>(&self, endpoints: I)
    where
        I: IntoIterator<Item = (S, WorkerRpcHandler)>,
        S: Into<String>,
    {
        *self.delegation.worker_rpc.write() = endpoints
            .into_iter()
            .map(|(name, h)| (name.into(), h))
            .collect();
    }

    /// Attach to a client socket. Idempotent.
    ///
    /// The socket joins the live table, and on disconnect its in-flight
    /// forwarded calls are discarded.
    pub fn upgrade_socket(&self, socket: Arc<dyn Socket>) -> bool {
        if !self.server.upgrade_socket(Arc::clone(&socket)) {
            return false;
        }
        self.sockets.insert(Arc::clone(&socket));

        let delegation = Arc::downgrade(&self.delegation);
        let sockets = self.sockets.clone();
        socket.on_disconnect(Box::new(move |socket_id| {
            sockets.remove(&socket_id);
            if let Some(delegation) = delegation.upgrade() {
                delegation.ledger.remove_socket(&socket_id);
            }
        }));
        true
    }

    /// Forget a socket and discard its in-flight forwarded calls.
    pub fn on_socket_disconnect(&self, socket_id: &SocketId) -> usize {
        self.sockets.remove(socket_id);
        self.delegation.ledger.remove_socket(socket_id)
    }

    /// Forward a call to the master on behalf of `socket_id`.
    ///
    /// `callback` is invoked exactly once unless the socket disconnects
    /// first: with the master's answer, with a timeout when the ledger entry
    /// expires, or with the failure when forwarding is impossible (the
    /// error is then also returned).
    pub fn send_to_master(
        &self,
        procedure: &str,
        data: Value,
        socket_id: &SocketId,
        callback: ResponseCallback,
    ) -> Result<Signature, DelegationError> {
        self.delegation
            .send_to_master(procedure, data, socket_id, callback)
    }

    /// Awaitable form of [`WorkerServer::send_to_master`].
    pub async fn call_master(
        &self,
        procedure: &str,
        data: Value,
        socket_id: &SocketId,
    ) -> Result<Value, RpcError> {
        let (tx, rx) = oneshot::channel();
        let _ = self.send_to_master(
            procedure,
            data,
            socket_id,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        rx.await
            .unwrap_or_else(|_| Err(RpcError::connection_lost("call discarded before an answer")))
    }

    /// Ask the master for configuration.
    pub fn request_config(&self) -> Result<(), DelegationError> {
        let payload = serde_json::to_value(ConfigRequest::new(self.worker_id()))?;
        self.delegation.channel.send_to_master(payload)?;
        debug!(worker_id = %self.worker_id(), "Requested configuration from master");
        Ok(())
    }

    /// Classify and act on one message from the master.
    pub fn handle_master_message(&self, payload: Value) -> Result<MasterOutcome, DelegationError> {
        let validator = &self.validator;

        if validator.validate(&payload, Shape::MasterRpcResponse)
            || validator.validate(&payload, Shape::RpcResponse)
        {
            let response: Response = serde_json::from_value(payload)?;
            return self.deliver_to_socket(response);
        }

        if validator.validate(&payload, Shape::InterProcessRpcResponse) {
            let response: Response = serde_json::from_value(payload)?;
            let key = CallKey::from_response(&response)?;
            let outcome = if self.delegation.ledger.complete(&key, response.into_result()) {
                MasterOutcome::Completed(key)
            } else {
                MasterOutcome::Dropped(key)
            };
            return Ok(outcome);
        }

        if validator.validate(&payload, Shape::MasterConfigResponse) {
            let push: ConfigPush = serde_json::from_value(payload)?;
            if let Some(events) = push.registered_events {
                let added = self.server.register_event_placeholders(events);
                debug!(added, "Registered placeholder event endpoints");
            }
            let snapshot = self.config.apply(&push.config);
            return Ok(MasterOutcome::Configured {
                version: snapshot.version,
            });
        }

        trace!(worker_id = %self.worker_id(), "Ignoring master message");
        Ok(MasterOutcome::Ignored)
    }

    /// Push a master answer to the socket it names.
    ///
    /// There is no pending call on the socket for it, so it goes out as an
    /// `rpc-response` frame; clients read it with
    /// [`WampSocket::on_response`](crate::client::WampSocket::on_response).
    fn deliver_to_socket(&self, response: Response) -> Result<MasterOutcome, DelegationError> {
        let Some(socket_id) = response.socket_id.clone() else {
            return Err(DelegationError::UnaddressedResponse(response.procedure));
        };

        let Some(socket) = self.sockets.get(&socket_id) else {
            error!(
                socket_id = %socket_id,
                procedure = %response.procedure,
                "Master answered for a socket that is not connected"
            );
            return Err(DelegationError::SocketNotFound(socket_id));
        };

        let mut request = response.as_request(MessageKind::RpcRequest);
        request.socket_id = None;
        request.worker_id = None;
        Responder::new(socket, request, None).respond(response.into_result());

        Ok(MasterOutcome::Delivered { socket_id })
    }

    /// Consume master messages until the channel closes.
    pub async fn run_master_listener<S>(self: Arc<Self>, mut source: S)
    where
        S: MasterMessageSource,
    {
        info!(worker_id = %self.worker_id(), "Master listener started");
        while let Some(payload) = source.next_message().await {
            if let Err(e) = self.handle_master_message(payload) {
                error!(worker_id = %self.worker_id(), error = %e, "Failed to handle master message");
            }
        }
        info!(worker_id = %self.worker_id(), "Master channel closed");
    }

    /// Request configuration, then spawn the master listener and the ledger
    /// sweeper.
    pub fn start<S>(self: &Arc<Self>, source: S) -> Result<WorkerTasks, DelegationError>
    where
        S: MasterMessageSource + 'static,
    {
        self.request_config()?;
        let listener = tokio::spawn(Arc::clone(self).run_master_listener(source));
        let sweeper = tokio::spawn(ledger::cleanup_task(
            Arc::clone(&self.delegation.ledger),
            self.sweep_interval,
        ));
        Ok(WorkerTasks { listener, sweeper })
    }
}

impl fmt::Debug for WorkerServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerServer")
            .field("worker_id", &self.delegation.worker_id)
            .field("in_flight", &self.delegation.ledger.len())
            .field("sockets", &self.sockets.len())
            .finish()
    }
}
