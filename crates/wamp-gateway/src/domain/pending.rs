//! Outstanding-call counters for the call gateway.
//!
//! Each procedure has a count of calls that were sent and have not reached a
//! terminal outcome. A call acquires a [`PendingGuard`] before anything is
//! emitted; dropping the guard, on any outcome, releases the slot. A
//! procedure's entry disappears when its count returns to zero.

use crate::domain::error::CallError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Statistics for the pending-call counters
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Calls admitted
    pub total_started: AtomicU64,
    /// Calls refused at the ceiling
    pub total_rejected: AtomicU64,
    /// Calls that released their slot
    pub total_finished: AtomicU64,
}

/// Per-procedure outstanding-call counters with a shared ceiling.
#[derive(Debug)]
pub struct PendingCalls {
    counts: Mutex<HashMap<String, usize>>,
    max_per_procedure: usize,
    stats: PendingStats,
}

impl PendingCalls {
    pub fn new(max_per_procedure: usize) -> Arc<Self> {
        Arc::new(Self {
            counts: Mutex::new(HashMap::new()),
            max_per_procedure,
            stats: PendingStats::default(),
        })
    }

    /// Reserve a slot for `procedure`, or refuse if the ceiling is reached.
    pub fn try_acquire(self: &Arc<Self>, procedure: &str) -> Result<PendingGuard, CallError> {
        let mut counts = self.counts.lock();
        let count = counts.get(procedure).copied().unwrap_or(0);

        if count >= self.max_per_procedure {
            drop(counts);
            self.stats.total_rejected.fetch_add(1, Ordering::Relaxed);
            warn!(
                procedure,
                outstanding = count,
                limit = self.max_per_procedure,
                "Rejecting call over the per-procedure ceiling"
            );
            return Err(CallError::CapacityExceeded {
                procedure: procedure.to_string(),
                limit: self.max_per_procedure,
            });
        }

        counts.insert(procedure.to_string(), count + 1);
        self.stats.total_started.fetch_add(1, Ordering::Relaxed);

        Ok(PendingGuard {
            calls: Arc::clone(self),
            procedure: procedure.to_string(),
        })
    }

    fn release(&self, procedure: &str) {
        let mut counts = self.counts.lock();
        match counts.get_mut(procedure) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                counts.remove(procedure);
            }
            None => {
                debug!(procedure, "Release for procedure with no outstanding calls");
                return;
            }
        }
        self.stats.total_finished.fetch_add(1, Ordering::Relaxed);
    }

    /// Outstanding calls for `procedure`.
    pub fn outstanding(&self, procedure: &str) -> usize {
        self.counts.lock().get(procedure).copied().unwrap_or(0)
    }

    /// Number of procedures with at least one outstanding call.
    pub fn tracked_procedures(&self) -> usize {
        self.counts.lock().len()
    }

    pub fn max_per_procedure(&self) -> usize {
        self.max_per_procedure
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

/// Holds one outstanding-call slot until dropped.
#[derive(Debug)]
pub struct PendingGuard {
    calls: Arc<PendingCalls>,
    procedure: String,
}

impl PendingGuard {
    pub fn procedure(&self) -> &str {
        &self.procedure
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.calls.release(&self.procedure);
    }
}
