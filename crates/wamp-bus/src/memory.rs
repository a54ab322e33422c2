//! # In-Memory Process Bus
//!
//! Runs the worker/master topology inside one tokio runtime. Each direction
//! is an unbounded `mpsc` channel, which preserves per-sender ordering and
//! never drops a message while both ends are alive.

use crate::channel::{
    BusError, MasterChannel, MasterMessageSource, WorkerChannel, WorkerEnvelope,
    WorkerMessageSource,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use wamp_types::WorkerId;

/// Message counters for the bus.
#[derive(Debug, Default)]
pub struct BusStats {
    /// Payloads enqueued for the master
    pub to_master: AtomicU64,
    /// Payloads enqueued for workers
    pub to_workers: AtomicU64,
}

/// In-memory implementation of both channel ends.
pub struct InMemoryProcessBus {
    /// Sender feeding the master inbox.
    master_tx: mpsc::UnboundedSender<WorkerEnvelope>,

    /// Senders feeding each attached worker's inbox.
    workers: RwLock<HashMap<WorkerId, mpsc::UnboundedSender<Value>>>,

    stats: Arc<BusStats>,
}

impl InMemoryProcessBus {
    /// Create a bus and the master's inbox.
    #[must_use]
    pub fn new() -> (Arc<Self>, MasterInbox) {
        let (master_tx, master_rx) = mpsc::unbounded_channel();
        let bus = Arc::new(Self {
            master_tx,
            workers: RwLock::new(HashMap::new()),
            stats: Arc::new(BusStats::default()),
        });
        (bus, MasterInbox { receiver: master_rx })
    }

    /// Attach a worker, returning its sending link and its inbox.
    pub fn attach_worker(&self, worker_id: WorkerId) -> Result<(WorkerLink, WorkerInbox), BusError> {
        let mut workers = self.workers.write();
        if workers.contains_key(&worker_id) {
            return Err(BusError::AlreadyAttached(worker_id));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        workers.insert(worker_id, tx);
        debug!(worker_id = %worker_id, "Worker attached to process bus");

        let link = WorkerLink {
            worker_id,
            master_tx: self.master_tx.clone(),
            stats: self.stats.clone(),
        };
        Ok((link, WorkerInbox { receiver: rx }))
    }

    /// Detach a worker. Its inbox yields `None` afterwards.
    pub fn detach_worker(&self, worker_id: WorkerId) -> bool {
        let removed = self.workers.write().remove(&worker_id).is_some();
        if removed {
            debug!(worker_id = %worker_id, "Worker detached from process bus");
        }
        removed
    }

    /// Number of attached workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.read().len()
    }

    /// Message counters.
    #[must_use]
    pub fn stats(&self) -> &BusStats {
        &self.stats
    }
}

impl WorkerChannel for InMemoryProcessBus {
    fn send_to_worker(&self, worker_id: WorkerId, payload: Value) -> Result<(), BusError> {
        let workers = self.workers.read();
        let tx = workers
            .get(&worker_id)
            .ok_or(BusError::WorkerNotAttached(worker_id))?;
        tx.send(payload)
            .map_err(|_| BusError::WorkerUnavailable(worker_id))?;
        self.stats.to_workers.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn broadcast(&self, payload: Value) -> usize {
        let workers = self.workers.read();
        let mut delivered = 0;
        for (worker_id, tx) in workers.iter() {
            if tx.send(payload.clone()).is_ok() {
                delivered += 1;
            } else {
                warn!(worker_id = %worker_id, "Broadcast skipped unavailable worker");
            }
        }
        self.stats
            .to_workers
            .fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }
}

/// Worker's sending end.
#[derive(Clone)]
pub struct WorkerLink {
    worker_id: WorkerId,
    master_tx: mpsc::UnboundedSender<WorkerEnvelope>,
    stats: Arc<BusStats>,
}

impl MasterChannel for WorkerLink {
    fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    fn send_to_master(&self, payload: Value) -> Result<(), BusError> {
        self.master_tx
            .send(WorkerEnvelope {
                worker_id: self.worker_id,
                payload,
            })
            .map_err(|_| BusError::MasterUnavailable)?;
        self.stats.to_master.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Worker's receiving end.
pub struct WorkerInbox {
    receiver: mpsc::UnboundedReceiver<Value>,
}

impl WorkerInbox {
    /// Non-blocking receive, for tests and polling loops.
    pub fn try_next(&mut self) -> Option<Value> {
        self.receiver.try_recv().ok()
    }
}

#[async_trait]
impl MasterMessageSource for WorkerInbox {
    async fn next_message(&mut self) -> Option<Value> {
        self.receiver.recv().await
    }
}

/// Master's receiving end.
pub struct MasterInbox {
    receiver: mpsc::UnboundedReceiver<WorkerEnvelope>,
}

impl MasterInbox {
    /// Non-blocking receive, for tests and polling loops.
    pub fn try_next(&mut self) -> Option<WorkerEnvelope> {
        self.receiver.try_recv().ok()
    }
}

#[async_trait]
impl WorkerMessageSource for MasterInbox {
    async fn next_message(&mut self) -> Option<WorkerEnvelope> {
        self.receiver.recv().await
    }
}
