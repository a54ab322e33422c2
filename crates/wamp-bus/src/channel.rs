//! # Channel Traits
//!
//! Both ends of the worker/master channel. Sending is synchronous: the
//! channel is assumed unbounded and ordered, so a send either enqueues or
//! reports that the other side is gone.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use wamp_types::WorkerId;

/// Errors from channel operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The master side of the channel has been dropped.
    #[error("Master process unavailable")]
    MasterUnavailable,

    /// No worker with this id is attached.
    #[error("Worker {0} is not attached")]
    WorkerNotAttached(WorkerId),

    /// The worker was attached but its inbox has been dropped.
    #[error("Worker {0} unavailable")]
    WorkerUnavailable(WorkerId),

    /// A worker with this id is already attached.
    #[error("Worker {0} is already attached")]
    AlreadyAttached(WorkerId),
}

/// A payload received by the master, stamped with its sender.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerEnvelope {
    pub worker_id: WorkerId,
    pub payload: Value,
}

/// Worker side: send to the master.
pub trait MasterChannel: Send + Sync {
    /// Id of the worker owning this end.
    fn worker_id(&self) -> WorkerId;

    /// Enqueue `payload` for the master.
    fn send_to_master(&self, payload: Value) -> Result<(), BusError>;
}

/// Worker side: receive what the master sends.
#[async_trait]
pub trait MasterMessageSource: Send {
    /// Next payload from the master, `None` once the master is gone.
    async fn next_message(&mut self) -> Option<Value>;
}

/// Master side: send to workers.
pub trait WorkerChannel: Send + Sync {
    /// Enqueue `payload` for one worker.
    fn send_to_worker(&self, worker_id: WorkerId, payload: Value) -> Result<(), BusError>;

    /// Enqueue `payload` for every attached worker.
    ///
    /// Returns the number of workers it was delivered to.
    fn broadcast(&self, payload: Value) -> usize;
}

/// Master side: receive what workers send.
#[async_trait]
pub trait WorkerMessageSource: Send {
    /// Next payload from any worker, `None` once every sender is gone.
    async fn next_message(&mut self) -> Option<WorkerEnvelope>;
}
