//! # WAMP Telemetry
//!
//! Structured logging for worker and master processes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wamp_telemetry::{init_tracing, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::for_worker(3);
//!     init_tracing(&config).expect("Failed to init tracing");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `WAMP_SERVICE_NAME` | `wamp-gateway` | Service name attached to every event |
//! | `WAMP_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `WAMP_CONSOLE_OUTPUT` | `true` | Emit to stdout |
//! | `WAMP_JSON_LOGS` | `false` (`true` in containers) | JSON formatted output |

mod config;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use tracing_setup::init_tracing;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),

    #[error("Invalid log filter: {0}")]
    Filter(String),
}

/// Convenience macro for a span tagged with the process role.
///
/// ```rust,ignore
/// let _span = wamp_telemetry::process_span!("forward", role = "worker", worker_id = 3).entered();
/// ```
#[macro_export]
macro_rules! process_span {
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}
