//! Worker/master call delegation.
//!
//! A worker serves its sockets locally when it can and forwards everything
//! else to the master over the process bus. Answers come back signed and
//! are matched in the worker's [`CallLedger`](crate::domain::CallLedger).

pub mod config_sync;
pub mod master;
pub mod worker;

pub use config_sync::{ConfigSnapshot, ConfigSync, ConfiguredCallback};
pub use master::{MasterResponder, MasterServer, WorkerOutcome};
pub use worker::{
    worker_rpc_handler, ForwardToMaster, MasterOutcome, WorkerRpcHandler, WorkerServer,
    WorkerTasks,
};
