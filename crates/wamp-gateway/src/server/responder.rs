//! Answers one inbound request on the socket it arrived on.

use crate::transport::{Ack, Socket};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use wamp_types::{Request, Response, RpcError, SocketId, RPC_RESPONSE_EVENT};

/// Handed to an RPC handler together with the request data.
///
/// Consuming [`Responder::respond`] guarantees a request is answered at
/// most once. The responder may be moved into a task and used later.
pub struct Responder {
    socket: Arc<dyn Socket>,
    request: Request,
    ack: Option<Ack>,
}

impl Responder {
    /// Answer through `ack` when present, else as an `rpc-response` frame.
    pub fn new(socket: Arc<dyn Socket>, request: Request, ack: Option<Ack>) -> Self {
        Self {
            socket,
            request,
            ack,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn socket_id(&self) -> &SocketId {
        self.socket.id()
    }

    /// Build the response envelope for `result` and send it.
    pub fn respond(self, result: Result<Value, RpcError>) -> Response {
        let response = Response::for_request(&self.request, result);
        let payload = match serde_json::to_value(&response) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(procedure = %response.procedure, error = %e, "Failed to encode response");
                return response;
            }
        };

        match self.ack {
            Some(ack) => ack.send(payload),
            None => {
                if let Err(e) = self.socket.emit(RPC_RESPONSE_EVENT, payload, None) {
                    debug!(
                        socket_id = %self.socket.id(),
                        procedure = %response.procedure,
                        error = %e,
                        "Response not delivered"
                    );
                }
            }
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

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("socket_id", self.socket.id())
            .field("procedure", &self.request.procedure)
            .field("ack", &self.ack.is_some())
            .finish()
    }
}
