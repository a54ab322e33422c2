//! # Error Types
//!
//! `RpcError` is the error value carried inside response envelopes. Numeric
//! codes follow the JSON-RPC 2.0 ranges so peers speaking plain JSON-RPC can
//! interpret them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Numeric error codes carried in `RpcError::code`.
pub mod codes {
    // JSON-RPC 2.0 standard errors (-32700 to -32600)
    pub const INVALID_REQUEST: i32 = -32600;
    pub const PROCEDURE_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // Server errors (-32000 to -32099)
    pub const SERVER_ERROR: i32 = -32000;
    pub const CONNECTION_LOST: i32 = -32002;
    pub const LIMIT_EXCEEDED: i32 = -32005;
    pub const TIMEOUT: i32 = -32006;
}

/// Error value travelling inside a response envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    /// Numeric code (see [`codes`])
    pub code: i32,
    /// Human readable message
    pub message: String,
    /// Optional structured detail
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i32, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Procedure is not registered anywhere reachable.
    ///
    /// The message enumerates the procedures that are known, so a client
    /// typo can be spotted from the error alone.
    pub fn procedure_not_registered(procedure: &str, known: &[String]) -> Self {
        Self::with_data(
            codes::PROCEDURE_NOT_FOUND,
            format!(
                "Procedure {} not registered. Available procedures: [{}]",
                procedure,
                known.join(", ")
            ),
            serde_json::json!({ "available": known }),
        )
    }

    /// Generic handler-side failure.
    pub fn server_error(details: impl Into<String>) -> Self {
        Self::new(codes::SERVER_ERROR, details.into())
    }

    pub fn internal(details: impl Into<String>) -> Self {
        Self::new(
            codes::INTERNAL_ERROR,
            format!("Internal error: {}", details.into()),
        )
    }

    pub fn invalid_request(details: impl Into<String>) -> Self {
        Self::new(
            codes::INVALID_REQUEST,
            format!("Invalid request: {}", details.into()),
        )
    }

    /// Too many outstanding calls for one procedure.
    pub fn limit_exceeded(limit: impl Into<String>) -> Self {
        Self::new(
            codes::LIMIT_EXCEEDED,
            format!("Limit exceeded: {}", limit.into()),
        )
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::new(
            codes::TIMEOUT,
            format!("Request timeout: {}", operation.into()),
        )
    }

    /// The socket or channel the answer had to travel on went away.
    pub fn connection_lost(details: impl Into<String>) -> Self {
        Self::new(
            codes::CONNECTION_LOST,
            format!("Connection lost: {}", details.into()),
        )
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

impl Serialize for RpcError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("RpcError", 3)?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("message", &self.message)?;
        if let Some(ref data) = self.data {
            state.serialize_field("data", data)?;
        }
        state.end()
    }
}

impl<'de> Deserialize<'de> for RpcError {
    /// Accepts both the structured form and a bare string, since handlers on
    /// the other side of a socket often answer with a plain message.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum ErrorHelper {
            Message(String),
            Structured {
                #[serde(default = "default_code")]
                code: i32,
                message: String,
                #[serde(default)]
                data: Option<serde_json::Value>,
            },
        }

        fn default_code() -> i32 {
            codes::SERVER_ERROR
        }

        Ok(match ErrorHelper::deserialize(deserializer)? {
            ErrorHelper::Message(message) => RpcError::server_error(message),
            ErrorHelper::Structured {
                code,
                message,
                data,
            } => RpcError {
                code,
                message,
                data,
            },
        })
    }
}

/// Errors raised while building or normalising an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// `procedure` must be a non-empty string.
    #[error("Wrong format of requested procedure: {0:?}")]
    InvalidProcedure(String),

    /// `socketId` must be a non-empty string.
    #[error("Wrong format of requested socket id: {0:?}")]
    InvalidSocketId(Option<String>),
}
