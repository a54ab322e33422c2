//! # Message Validation
//!
//! Receivers never trust the shape of an inbound JSON payload. Each consumer
//! asks a [`MessageValidator`] whether a payload matches a named [`Shape`]
//! before deserializing it. [`StructuralValidator`] is the default
//! implementation; deployments may plug in a full JSON-schema engine instead.

use crate::envelope::MessageKind;
use serde_json::{Map, Value};

/// Named message shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    RpcRequest,
    RpcResponse,
    MasterRpcRequest,
    MasterRpcResponse,
    InterProcessRpcRequest,
    InterProcessRpcResponse,
    MasterConfigRequest,
    MasterConfigResponse,
}

impl Shape {
    /// The `type` value a payload of this shape must carry.
    pub fn kind(self) -> MessageKind {
        match self {
            Shape::RpcRequest => MessageKind::RpcRequest,
            Shape::RpcResponse => MessageKind::RpcResponse,
            Shape::MasterRpcRequest => MessageKind::MasterRpcRequest,
            Shape::MasterRpcResponse => MessageKind::MasterRpcResponse,
            Shape::InterProcessRpcRequest => MessageKind::InterProcessRpcRequest,
            Shape::InterProcessRpcResponse => MessageKind::InterProcessRpcResponse,
            Shape::MasterConfigRequest => MessageKind::MasterConfigRequest,
            Shape::MasterConfigResponse => MessageKind::MasterConfigResponse,
        }
    }
}

/// Validation seam.
pub trait MessageValidator: Send + Sync {
    /// Returns true when `payload` matches `shape`.
    fn validate(&self, payload: &Value, shape: Shape) -> bool;
}

/// Field-level validator for the built-in shapes.
///
/// Checks the `type` discriminator, the presence and JSON type of required
/// fields, and that routing identifiers are non-empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralValidator;

impl StructuralValidator {
    pub fn new() -> Self {
        Self
    }
}

impl MessageValidator for StructuralValidator {
    fn validate(&self, payload: &Value, shape: Shape) -> bool {
        let Some(obj) = payload.as_object() else {
            return false;
        };
        if obj.get("type").and_then(Value::as_str) != Some(shape.kind().as_str()) {
            return false;
        }

        match shape {
            Shape::RpcRequest => {
                non_empty_str(obj, "procedure") && optional_id(obj, "socketId")
            }
            Shape::RpcResponse => {
                non_empty_str(obj, "procedure")
                    && is_bool(obj, "success")
                    && optional_id(obj, "socketId")
            }
            Shape::MasterRpcRequest => {
                non_empty_str(obj, "procedure")
                    && non_empty_str(obj, "socketId")
                    && is_worker_id(obj)
            }
            Shape::MasterRpcResponse => {
                non_empty_str(obj, "procedure")
                    && is_bool(obj, "success")
                    && non_empty_str(obj, "socketId")
            }
            Shape::InterProcessRpcRequest => {
                non_empty_str(obj, "procedure")
                    && non_empty_str(obj, "socketId")
                    && non_empty_str(obj, "signature")
                    && is_worker_id(obj)
            }
            Shape::InterProcessRpcResponse => {
                non_empty_str(obj, "procedure")
                    && non_empty_str(obj, "socketId")
                    && non_empty_str(obj, "signature")
                    && is_bool(obj, "success")
            }
            Shape::MasterConfigRequest => is_worker_id(obj),
            Shape::MasterConfigResponse => {
                obj.get("config").map_or(true, Value::is_object)
                    && match obj.get("registeredEvents") {
                        None | Some(Value::Null) => true,
                        Some(Value::Array(events)) => events.iter().all(Value::is_string),
                        Some(_) => false,
                    }
            }
        }
    }
}

fn non_empty_str(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
}

fn optional_id(obj: &Map<String, Value>, key: &str) -> bool {
    match obj.get(key) {
        None | Some(Value::Null) => true,
        Some(_) => non_empty_str(obj, key),
    }
}

fn is_bool(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).is_some_and(Value::is_boolean)
}

fn is_worker_id(obj: &Map<String, Value>) -> bool {
    obj.get("workerId")
        .and_then(Value::as_u64)
        .is_some_and(|id| id <= u64::from(u32::MAX))
}
