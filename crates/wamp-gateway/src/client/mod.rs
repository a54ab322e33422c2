//! Client role: outbound calls with per-procedure ceilings and timeouts.

pub mod gateway;

pub use gateway::{WampClient, WampSocket};
