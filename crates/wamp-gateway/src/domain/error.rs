//! Gateway error types.
//!
//! Each error maps onto the wire-level [`RpcError`] when it has to travel
//! back to a caller inside a response envelope.

use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;
use wamp_bus::BusError;
use wamp_types::{EnvelopeError, RpcError, Signature, SocketId};

/// Outcome of a client-side call that did not produce data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// Too many outstanding calls for the procedure; nothing was sent.
    #[error("No more than {limit} calls allowed for procedure {procedure}")]
    CapacityExceeded { procedure: String, limit: usize },

    /// No response within the configured timeout.
    #[error("Call to {procedure} timed out after {}ms", after.as_millis())]
    Timeout { procedure: String, after: Duration },

    /// The peer dropped the call without answering.
    #[error("Call to {procedure} ended without a response")]
    NoResponse { procedure: String },

    /// The procedure answered with an error.
    #[error("{0}")]
    Rejected(RpcError),

    /// The answer did not decode as a response envelope.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Failed to encode request: {0}")]
    Encode(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl CallError {
    /// Wire representation, for relaying the failure to another caller.
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            CallError::CapacityExceeded { .. } => RpcError::limit_exceeded(self.to_string()),
            CallError::Timeout { procedure, .. } => RpcError::timeout(procedure.clone()),
            CallError::NoResponse { .. } | CallError::Transport(_) => {
                RpcError::connection_lost(self.to_string())
            }
            CallError::Rejected(error) => error.clone(),
            CallError::MalformedResponse(_) | CallError::Encode(_) => {
                RpcError::internal(self.to_string())
            }
        }
    }
}

/// Consistency errors of the inter-process call ledger.
///
/// These signal programming errors in the caller rather than bad input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Cannot record a call without {0}")]
    MissingField(&'static str),

    #[error("Call already recorded for socket {socket_id}, procedure {procedure} with signature {signature}")]
    AlreadyRecorded {
        socket_id: SocketId,
        procedure: String,
        signature: Signature,
    },

    #[error("There is no call registered for socket {socket_id}, procedure {procedure} with signature {signature}")]
    NotRecorded {
        socket_id: SocketId,
        procedure: String,
        signature: Signature,
    },

    #[error("No free signature for socket {socket_id}, procedure {procedure} after {attempts} attempts")]
    SignatureSpaceExhausted {
        socket_id: SocketId,
        procedure: String,
        attempts: usize,
    },
}

/// Errors raised by the worker-side delegation layer.
#[derive(Debug, Error)]
pub enum DelegationError {
    /// A master answer is addressed to a socket this worker no longer has.
    #[error("Socket {0} that requested the call is not connected anymore")]
    SocketNotFound(SocketId),

    /// A master answer that should carry a socket id does not.
    #[error("Response for procedure {0} carries no socket id")]
    UnaddressedResponse(String),

    /// Payload passed validation but did not decode.
    #[error("Malformed master message: {0}")]
    Malformed(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl From<serde_json::Error> for DelegationError {
    fn from(err: serde_json::Error) -> Self {
        DelegationError::Malformed(err.to_string())
    }
}
