//! # WAMP Types Crate
//!
//! Message envelopes, identifiers and validation shapes shared by every role
//! of the protocol: the client-side call gateway, the worker-side dispatcher
//! and the master process.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every message crossing a socket or the
//!   worker/master channel is one of the envelopes defined here.
//! - **Total Response Table**: every request kind maps to exactly one
//!   response kind (`MessageKind::response_kind`).
//! - **Untrusted Input**: inbound payloads are raw JSON until a
//!   [`MessageValidator`] has accepted them for a given [`Shape`].

pub mod envelope;
pub mod errors;
pub mod ids;
pub mod schema;

pub use envelope::{ConfigPush, ConfigRequest, MessageKind, Request, Response};
pub use errors::{codes, EnvelopeError, RpcError};
pub use ids::{Signature, SocketId, WorkerId};
pub use schema::{MessageValidator, Shape, StructuralValidator};

/// Socket event name carrying RPC request frames.
pub const RPC_REQUEST_EVENT: &str = "rpc-request";

/// Socket event name carrying responses pushed without an acknowledgement.
pub const RPC_RESPONSE_EVENT: &str = "rpc-response";
