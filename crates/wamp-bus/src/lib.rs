//! # WAMP Bus - Worker/Master Channel
//!
//! The delegation tier runs many worker processes against one master
//! process. This crate defines the channel between them and an in-memory
//! implementation used when the whole topology lives in one runtime.
//!
//! ```text
//! ┌──────────┐  send_to_master()   ┌──────────────┐
//! │ Worker 1 │ ──────────────────→ │              │
//! ├──────────┤                     │    Master    │
//! │ Worker 2 │ ←────────────────── │              │
//! └──────────┘  send_to_worker()   └──────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Delivery is ordered and reliable per direction.
//! - There is no request/response pairing at this layer; correlation is
//!   the job of the signature carried inside each payload.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod channel;
pub mod memory;

pub use channel::{
    BusError, MasterChannel, MasterMessageSource, WorkerChannel, WorkerEnvelope,
    WorkerMessageSource,
};
pub use memory::{BusStats, InMemoryProcessBus, MasterInbox, WorkerInbox, WorkerLink};
