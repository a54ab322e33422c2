//! Domain types for the gateway.
//!
//! Configuration, errors, and the two correlation structures: the client's
//! outstanding-call counters and the worker's inter-process call ledger.

pub mod config;
pub mod error;
pub mod ledger;
pub mod pending;
pub mod signature;

// Re-exports for convenience
pub use config::{ClientConfig, ConfigError, GatewayConfig, LedgerConfig};
pub use error::{CallError, DelegationError, LedgerError};
pub use ledger::{CallKey, CallLedger, LedgerStats, ResponseCallback};
pub use pending::{PendingCalls, PendingGuard, PendingStats};
pub use signature::{generate_signature, MAX_GENERATE_ATTEMPTS};
