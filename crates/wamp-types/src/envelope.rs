//! # Message Envelopes
//!
//! Logical message shapes exchanged on client sockets and on the
//! worker/master channel. The `type` field ([`MessageKind`]) is how a receiver
//! discriminates an otherwise uniform stream of JSON objects.

use crate::errors::{EnvelopeError, RpcError};
use crate::ids::{Signature, SocketId, WorkerId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed set of message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    /// Client → server procedure call.
    RpcRequest,
    /// Answer to an `RpcRequest`.
    RpcResponse,
    /// One-way notification, never answered.
    Event,
    /// Worker → master call answered directly to the socket.
    MasterRpcRequest,
    /// Master answer addressed to a socket.
    MasterRpcResponse,
    /// Worker → master call correlated through the call ledger.
    InterProcessRpcRequest,
    /// Master answer tagged with socket id, procedure and signature.
    InterProcessRpcResponse,
    /// Worker asks the master for its configuration.
    MasterConfigRequest,
    /// Configuration push from the master.
    MasterConfigResponse,
}

impl MessageKind {
    /// Every kind that can be sent as a request.
    pub const REQUEST_KINDS: [MessageKind; 5] = [
        MessageKind::RpcRequest,
        MessageKind::Event,
        MessageKind::MasterRpcRequest,
        MessageKind::InterProcessRpcRequest,
        MessageKind::MasterConfigRequest,
    ];

    /// Request-type → response-type table.
    ///
    /// Total over [`Self::REQUEST_KINDS`]: events that travel through the RPC
    /// channel are answered like plain RPC requests. Response kinds have no
    /// response of their own.
    pub fn response_kind(self) -> Option<MessageKind> {
        match self {
            MessageKind::RpcRequest | MessageKind::Event => Some(MessageKind::RpcResponse),
            MessageKind::MasterRpcRequest => Some(MessageKind::MasterRpcResponse),
            MessageKind::InterProcessRpcRequest => Some(MessageKind::InterProcessRpcResponse),
            MessageKind::MasterConfigRequest => Some(MessageKind::MasterConfigResponse),
            MessageKind::RpcResponse
            | MessageKind::MasterRpcResponse
            | MessageKind::InterProcessRpcResponse
            | MessageKind::MasterConfigResponse => None,
        }
    }

    /// Wire name, as it appears in the `type` field.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::RpcRequest => "rpcRequest",
            MessageKind::RpcResponse => "rpcResponse",
            MessageKind::Event => "event",
            MessageKind::MasterRpcRequest => "masterRpcRequest",
            MessageKind::MasterRpcResponse => "masterRpcResponse",
            MessageKind::InterProcessRpcRequest => "interProcessRpcRequest",
            MessageKind::InterProcessRpcResponse => "interProcessRpcResponse",
            MessageKind::MasterConfigRequest => "masterConfigRequest",
            MessageKind::MasterConfigResponse => "masterConfigResponse",
        }
    }
}

/// Request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub procedure: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_id: Option<SocketId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl Request {
    /// Plain client → server procedure call.
    pub fn rpc(procedure: impl Into<String>, data: Value) -> Self {
        Self {
            kind: MessageKind::RpcRequest,
            procedure: procedure.into(),
            data,
            socket_id: None,
            worker_id: None,
            signature: None,
        }
    }

    /// Call made from a worker to the master on behalf of `socket_id`.
    ///
    /// Fails when `procedure` or `socket_id` is empty: both are key segments
    /// of the call ledger.
    pub fn inter_process(
        procedure: impl Into<String>,
        data: Value,
        socket_id: SocketId,
        worker_id: WorkerId,
        signature: Signature,
    ) -> Result<Self, EnvelopeError> {
        let request = Self {
            kind: MessageKind::InterProcessRpcRequest,
            procedure: procedure.into(),
            data,
            socket_id: Some(socket_id),
            worker_id: Some(worker_id),
            signature: Some(signature),
        };
        request.ensure_routable()?;
        Ok(request)
    }

    /// Checks the fields used for routing an answer back.
    pub fn ensure_routable(&self) -> Result<(), EnvelopeError> {
        if self.procedure.is_empty() {
            return Err(EnvelopeError::InvalidProcedure(self.procedure.clone()));
        }
        match &self.socket_id {
            Some(id) if !id.is_empty() => Ok(()),
            other => Err(EnvelopeError::InvalidSocketId(
                other.as_ref().map(|id| id.to_string()),
            )),
        }
    }
}

/// Response envelope: the request's routing fields plus the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub procedure: String,
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_id: Option<SocketId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl Response {
    /// Build the answer to `request` from a handler outcome.
    pub fn for_request(request: &Request, result: Result<Value, RpcError>) -> Self {
        let kind = request
            .kind
            .response_kind()
            .unwrap_or(MessageKind::RpcResponse);
        let (success, data, error) = match result {
            Ok(data) => (true, data, None),
            Err(error) => (false, Value::Null, Some(error)),
        };
        Self {
            kind,
            procedure: request.procedure.clone(),
            success,
            data,
            error,
            socket_id: request.socket_id.clone(),
            worker_id: request.worker_id,
            signature: request.signature.clone(),
        }
    }

    /// Collapse into the outcome a caller sees.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match (self.success, self.error) {
            (true, _) => Ok(self.data),
            (false, Some(error)) => Err(error),
            (false, None) => Err(RpcError::server_error(format!(
                "Procedure {} failed without an error",
                self.procedure
            ))),
        }
    }

    /// Reinterpret as the request it answers, keeping routing fields.
    ///
    /// Used when an answer addressed to a socket must be replayed through the
    /// local responder path.
    pub fn as_request(&self, kind: MessageKind) -> Request {
        Request {
            kind,
            procedure: self.procedure.clone(),
            data: Value::Null,
            socket_id: self.socket_id.clone(),
            worker_id: self.worker_id,
            signature: self.signature.clone(),
        }
    }
}

/// Worker → master request for configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRequest {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub worker_id: WorkerId,
}

impl ConfigRequest {
    pub fn new(worker_id: WorkerId) -> Self {
        Self {
            kind: MessageKind::MasterConfigRequest,
            worker_id,
        }
    }
}

/// Master → worker configuration push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPush {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_events: Option<Vec<String>>,
}

impl ConfigPush {
    pub fn new(config: Map<String, Value>, registered_events: Option<Vec<String>>) -> Self {
        Self {
            kind: MessageKind::MasterConfigResponse,
            config,
            registered_events,
        }
    }
}
