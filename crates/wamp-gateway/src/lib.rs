#![allow(missing_docs)]

//! WAMP Gateway - RPC and events over persistent sockets.
//!
//! Three roles share one message vocabulary ([`wamp_types`]):
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   rpc-request (ack)   ┌──────────────────────────────┐
//! │  WampClient  │ ────────────────────→ │        WorkerServer          │
//! │              │ ←──────────────────── │                              │
//! │ per-procedure│      rpc-response     │  ┌────────────────────────┐  │
//! │   ceilings   │                       │  │  WampServer dispatch   │  │
//! └──────────────┘                       │  │ local rpc / event map  │  │
//!                                        │  └───────────┬────────────┘  │
//!                                        │              │ unhandled     │
//!                                        │  ┌───────────┴────────────┐  │
//!                                        │  │      CallLedger        │  │
//!                                        │  │ (socket, proc, sig)    │  │
//!                                        │  └───────────┬────────────┘  │
//!                                        └──────────────┼───────────────┘
//!                                                       │ process bus
//!                                        ┌──────────────┴───────────────┐
//!                                        │        MasterServer          │
//!                                        │  endpoints + configuration   │
//!                                        └──────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use wamp_gateway::{GatewayConfig, WorkerServer};
//!
//! let worker = WorkerServer::new(link, sockets, &GatewayConfig::from_env()?);
//! let tasks = worker.start(inbox)?;
//! worker.upgrade_socket(socket);
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod client;
pub mod delegation;
pub mod domain;
pub mod registry;
pub mod server;
pub mod transport;

// Re-exports for public API
pub use client::{WampClient, WampSocket};
pub use delegation::{
    worker_rpc_handler, ConfigSnapshot, ConfigSync, MasterOutcome, MasterResponder,
    MasterServer, WorkerOutcome, WorkerServer, WorkerTasks,
};
pub use domain::config::{ClientConfig, ConfigError, GatewayConfig, LedgerConfig};
pub use domain::error::{CallError, DelegationError, LedgerError};
pub use domain::ledger::{CallKey, CallLedger};
pub use registry::{event_handler, rpc_handler, EndpointRegistry, EventHandler, RpcHandler};
pub use server::{RejectUnregistered, RequestHook, Responder, WampServer};
pub use transport::{Ack, MemoryServer, MemorySocket, Socket, SocketTable, TransportError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
