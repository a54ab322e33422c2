//! # Master Server
//!
//! The single back process every worker forwards to. It owns its own
//! endpoint registry and answers on the worker channel:
//!
//! | inbound                   | answer                                 |
//! |---------------------------|----------------------------------------|
//! | `interProcessRpcRequest`  | `interProcessRpcResponse` (signed)     |
//! | `masterRpcRequest`        | `masterRpcResponse` (socket addressed) |
//! | `masterConfigRequest`     | `masterConfigResponse`                 |
//!
//! Unknown procedures are answered with the not-registered error.

use crate::domain::error::DelegationError;
use crate::registry::{Endpoint, EndpointRegistry, EventHandler, RpcHandler};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use wamp_bus::{WorkerChannel, WorkerEnvelope, WorkerMessageSource};
use wamp_types::{
    ConfigPush, MessageValidator, Request, Response, RpcError, Shape, StructuralValidator,
    WorkerId,
};

/// Answers one forwarded request back to the worker that sent it.
pub struct MasterResponder {
    channel: Arc<dyn WorkerChannel>,
    worker_id: WorkerId,
    request: Request,
}

impl MasterResponder {
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn respond(self, result: Result<Value, RpcError>) -> Response {
        let response = Response::for_request(&self.request, result);
        match serde_json::to_value(&response) {
            Ok(payload) => {
                if let Err(e) = self.channel.send_to_worker(self.worker_id, payload) {
                    warn!(
                        worker_id = %self.worker_id,
                        procedure = %response.procedure,
                        error = %e,
                        "Answer not delivered to worker"
                    );
                }
            }
            Err(e) => warn!(procedure = %response.procedure, error = %e, "Failed to encode answer"),
        }
        response
    }

    pub fn ok(self, data: Value) -> Response {
        self.respond(Ok(data))
    }

    pub fn err(self, error: RpcError) -> Response {
        self.respond(Err(error))
    }
}

impl fmt::Debug for MasterResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterResponder")
            .field("worker_id", &self.worker_id)
            .field("procedure", &self.request.procedure)
            .finish()
    }
}

/// What a worker message turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Handed to an RPC endpoint.
    Dispatched,
    /// Handed to an event endpoint; no answer.
    EventDispatched,
    /// Answered with the not-registered error.
    NotRegistered,
    /// Configuration sent to the worker.
    ConfigSent,
    Ignored,
}

/// Master role.
pub struct MasterServer {
    endpoints: RwLock<EndpointRegistry<MasterResponder>>,
    config: RwLock<Map<String, Value>>,
    channel: Arc<dyn WorkerChannel>,
    validator: Arc<dyn MessageValidator>,
}

impl MasterServer {
    pub fn new(channel: Arc<dyn WorkerChannel>) -> Arc<Self> {
        Self::with_validator(channel, Arc::new(StructuralValidator::new()))
    }

    pub fn with_validator(
        channel: Arc<dyn WorkerChannel>,
        validator: Arc<dyn MessageValidator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            endpoints: RwLock::new(EndpointRegistry::new()),
            config: RwLock::new(Map::new()),
            channel,
            validator,
        })
    }

    pub fn register_rpc_endpoints<I, S>(&self, endpoints: I)
    where
        I: IntoIterator<Item = (S, RpcHandler<MasterResponder>)>,
        S: Into<String>,
    {
        self.endpoints.write().register_rpc(endpoints);
    }

    /// Event names registered here are advertised to workers with the
    /// configuration.
    pub fn register_event_endpoints<I, S>(&self, endpoints: I)
    where
        I: IntoIterator<Item = (S, EventHandler)>,
        S: Into<String>,
    {
        self.endpoints.write().register_events(endpoints);
    }

    pub fn reassign_rpc_endpoints<I, S>(&self, endpoints: I)
    where
        I: IntoIterator<Item = (S, RpcHandler<MasterResponder>)>,
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

    /// Replace the configuration handed to workers.
    pub fn set_config(&self, config: Map<String, Value>) {
        *self.config.write() = config;
    }

    pub fn config_push(&self) -> ConfigPush {
        ConfigPush::new(
            self.config.read().clone(),
            Some(self.endpoints.read().event_names()),
        )
    }

    /// Send the configuration to one worker.
    pub fn push_config(&self, worker_id: WorkerId) -> Result<(), DelegationError> {
        let payload = serde_json::to_value(self.config_push())?;
        self.channel.send_to_worker(worker_id, payload)?;
        debug!(worker_id = %worker_id, "Configuration sent to worker");
        Ok(())
    }

    /// Send the configuration to every worker. Returns how many got it.
    pub fn broadcast_config(&self) -> usize {
        match serde_json::to_value(self.config_push()) {
            Ok(payload) => self.channel.broadcast(payload),
            Err(e) => {
                warn!(error = %e, "Failed to encode configuration");
                0
            }
        }
    }

    /// Route one message from a worker.
    ///
    /// The bus's worker id is authoritative for where the answer goes.
    pub fn handle_worker_message(&self, envelope: WorkerEnvelope) -> WorkerOutcome {
        let WorkerEnvelope { worker_id, payload } = envelope;

        if self.validator.validate(&payload, Shape::InterProcessRpcRequest)
            || self.validator.validate(&payload, Shape::MasterRpcRequest)
        {
            return match serde_json::from_value::<Request>(payload) {
                Ok(request) => self.dispatch(worker_id, request),
                Err(e) => {
                    debug!(worker_id = %worker_id, error = %e, "Dropping undecodable request");
                    WorkerOutcome::Ignored
                }
            };
        }

        if self.validator.validate(&payload, Shape::MasterConfigRequest) {
            return match self.push_config(worker_id) {
                Ok(()) => WorkerOutcome::ConfigSent,
                Err(e) => {
                    warn!(worker_id = %worker_id, error = %e, "Configuration not delivered");
                    WorkerOutcome::Ignored
                }
            };
        }

        trace!(worker_id = %worker_id, "Ignoring worker message");
        WorkerOutcome::Ignored
    }

    fn dispatch(&self, worker_id: WorkerId, request: Request) -> WorkerOutcome {
        let endpoint = self.endpoints.read().resolve(&request.procedure);
        let responder = MasterResponder {
            channel: Arc::clone(&self.channel),
            worker_id,
            request,
        };

        match endpoint {
            Some(Endpoint::Rpc(handler)) => {
                let data = responder.request.data.clone();
                handler(data, responder);
                WorkerOutcome::Dispatched
            }
            Some(Endpoint::Event(handler)) => {
                handler(responder.request.data.clone());
                WorkerOutcome::EventDispatched
            }
            None => {
                let known = self.endpoints.read().known_procedures();
                let error = RpcError::procedure_not_registered(&responder.request.procedure, &known);
                debug!(
                    worker_id = %worker_id,
                    procedure = %responder.request.procedure,
                    "Procedure not registered on master"
                );
                responder.err(error);
                WorkerOutcome::NotRegistered
            }
        }
    }

    /// Consume worker messages until every worker link is gone.
    pub async fn run<S>(self: Arc<Self>, mut source: S)
    where
        S: WorkerMessageSource,
    {
        info!("Master listener started");
        while let Some(envelope) = source.next_message().await {
            self.handle_worker_message(envelope);
        }
        info!("Master listener stopped");
    }
}

impl fmt::Debug for MasterServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterServer")
            .field("endpoints", &*self.endpoints.read())
            .finish()
    }
}
