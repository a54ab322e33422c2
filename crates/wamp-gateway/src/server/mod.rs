//! Server role: socket upgrade, request routing and response building.

pub mod dispatcher;
pub mod responder;

pub use dispatcher::{RejectUnregistered, RequestHook, WampServer};
pub use responder::Responder;
