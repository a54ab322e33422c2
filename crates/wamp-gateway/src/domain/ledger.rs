//! # Inter-Process Call Ledger
//!
//! Tracks calls a worker forwarded to the master and has not yet seen
//! answered. Each entry is keyed by `(socket id, procedure, signature)` and
//! holds the callback that delivers the answer.
//!
//! ```text
//!  forward ──→ record(key, cb) ──→ [ ledger ] ──→ take(key) ──→ cb(result)
//!                                      │
//!              socket disconnect ──→ remove_socket(id)   (cb dropped)
//!              sweep            ──→ remove_expired()     (cb(timeout))
//! ```
//!
//! ## Guarantees
//!
//! - A callback handed to the ledger is invoked at most once. Matching a key
//!   removes it atomically, so a duplicate answer finds nothing.
//! - Callbacks always run after the ledger lock is released.
//! - If recording fails, the callback is answered with the failure before
//!   the error is returned.

use crate::domain::error::LedgerError;
use crate::domain::signature::{generate_signature, MAX_GENERATE_ATTEMPTS};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use wamp_types::{Request, Response, RpcError, Signature, SocketId};

/// Delivers the outcome of a forwarded call.
pub type ResponseCallback = Box<dyn FnOnce(Result<Value, RpcError>) + Send + 'static>;

/// Ledger key of one in-flight call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey {
    pub socket_id: SocketId,
    pub procedure: String,
    pub signature: Signature,
}

impl CallKey {
    pub fn new(socket_id: SocketId, procedure: impl Into<String>, signature: Signature) -> Self {
        Self {
            socket_id,
            procedure: procedure.into(),
            signature,
        }
    }

    /// Key of a forwarded request.
    pub fn from_request(request: &Request) -> Result<Self, LedgerError> {
        key_from(
            request.socket_id.as_ref(),
            &request.procedure,
            request.signature.as_ref(),
        )
    }

    /// Key echoed back by the answer to a forwarded request.
    pub fn from_response(response: &Response) -> Result<Self, LedgerError> {
        key_from(
            response.socket_id.as_ref(),
            &response.procedure,
            response.signature.as_ref(),
        )
    }

    fn check(&self) -> Result<(), LedgerError> {
        if self.socket_id.is_empty() {
            return Err(LedgerError::MissingField("socketId"));
        }
        if self.procedure.is_empty() {
            return Err(LedgerError::MissingField("procedure"));
        }
        if self.signature.is_empty() {
            return Err(LedgerError::MissingField("signature"));
        }
        Ok(())
    }
}

fn key_from(
    socket_id: Option<&SocketId>,
    procedure: &str,
    signature: Option<&Signature>,
) -> Result<CallKey, LedgerError> {
    let key = CallKey {
        socket_id: socket_id
            .cloned()
            .ok_or(LedgerError::MissingField("socketId"))?,
        procedure: procedure.to_string(),
        signature: signature
            .cloned()
            .ok_or(LedgerError::MissingField("signature"))?,
    };
    key.check()?;
    Ok(key)
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.socket_id, self.procedure, self.signature)
    }
}

struct LedgerEntry {
    callback: ResponseCallback,
    recorded_at: Instant,
}

/// Statistics for the call ledger
#[derive(Debug, Default)]
pub struct LedgerStats {
    /// Entries recorded
    pub recorded: AtomicU64,
    /// Entries answered by a matching response
    pub completed: AtomicU64,
    /// Responses that matched no entry
    pub dropped: AtomicU64,
    /// Entries failed by the expiry sweep
    pub expired: AtomicU64,
    /// Entries discarded because their socket disconnected
    pub disconnected: AtomicU64,
}

/// Flat map of in-flight forwarded calls.
pub struct CallLedger {
    entries: Mutex<HashMap<CallKey, LedgerEntry>>,
    entry_ttl: Duration,
    stats: LedgerStats,
}

impl CallLedger {
    pub fn new(entry_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            entry_ttl,
            stats: LedgerStats::default(),
        }
    }

    /// Record `callback` under an explicit key.
    pub fn record(&self, key: CallKey, callback: ResponseCallback) -> Result<(), LedgerError> {
        if let Err(err) = key.check() {
            callback(Err(RpcError::internal(err.to_string())));
            return Err(err);
        }

        let mut entries = self.entries.lock();
        if entries.contains_key(&key) {
            drop(entries);
            let err = LedgerError::AlreadyRecorded {
                socket_id: key.socket_id,
                procedure: key.procedure,
                signature: key.signature,
            };
            callback(Err(RpcError::internal(err.to_string())));
            return Err(err);
        }

        debug!(call = %key, "Recorded forwarded call");
        entries.insert(
            key,
            LedgerEntry {
                callback,
                recorded_at: Instant::now(),
            },
        );
        self.stats.recorded.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Draw a fresh signature for `(socket_id, procedure)` and record
    /// `callback` under it, in one step.
    pub fn record_new(
        &self,
        socket_id: &SocketId,
        procedure: &str,
        callback: ResponseCallback,
    ) -> Result<CallKey, LedgerError> {
        let probe = CallKey::new(socket_id.clone(), procedure, Signature::new("-"));
        if let Err(err) = probe.check() {
            callback(Err(RpcError::internal(err.to_string())));
            return Err(err);
        }

        let mut entries = self.entries.lock();
        let signature = generate_signature(|candidate| {
            entries.contains_key(&CallKey::new(
                socket_id.clone(),
                procedure,
                candidate.clone(),
            ))
        });

        let Some(signature) = signature else {
            drop(entries);
            let err = LedgerError::SignatureSpaceExhausted {
                socket_id: socket_id.clone(),
                procedure: procedure.to_string(),
                attempts: MAX_GENERATE_ATTEMPTS,
            };
            callback(Err(RpcError::internal(err.to_string())));
            return Err(err);
        };

        let key = CallKey::new(socket_id.clone(), procedure, signature);
        debug!(call = %key, "Recorded forwarded call");
        entries.insert(
            key.clone(),
            LedgerEntry {
                callback,
                recorded_at: Instant::now(),
            },
        );
        self.stats.recorded.fetch_add(1, Ordering::Relaxed);
        Ok(key)
    }

    /// Remove the entry and hand back its callback. `None` if not in flight.
    pub fn take(&self, key: &CallKey) -> Option<ResponseCallback> {
        self.entries.lock().remove(key).map(|entry| entry.callback)
    }

    /// Answer the call at `key` with `result`.
    ///
    /// Returns false, and drops `result`, when nothing is in flight at `key`.
    pub fn complete(&self, key: &CallKey, result: Result<Value, RpcError>) -> bool {
        match self.take(key) {
            Some(callback) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                debug!(call = %key, success = result.is_ok(), "Completed forwarded call");
                callback(result);
                true
            }
            None => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(call = %key, "Dropping answer for call not in flight");
                false
            }
        }
    }

    /// Discard the entry at `key` without answering it.
    pub fn delete(&self, key: &CallKey) -> Result<(), LedgerError> {
        match self.take(key) {
            Some(_) => Ok(()),
            None => Err(LedgerError::NotRecorded {
                socket_id: key.socket_id.clone(),
                procedure: key.procedure.clone(),
                signature: key.signature.clone(),
            }),
        }
    }

    /// Discard every entry belonging to `socket_id`.
    pub fn remove_socket(&self, socket_id: &SocketId) -> usize {
        let removed = {
            let mut entries = self.entries.lock();
            let before = entries.len();
            entries.retain(|key, _| &key.socket_id != socket_id);
            before - entries.len()
        };

        if removed > 0 {
            self.stats
                .disconnected
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!(socket_id = %socket_id, removed, "Discarded calls of disconnected socket");
        }
        removed
    }

    /// Fail every entry older than the TTL with a timeout error.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<(CallKey, LedgerEntry)> = {
            let mut entries = self.entries.lock();
            let keys: Vec<CallKey> = entries
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.recorded_at) >= self.entry_ttl)
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| entries.remove(&key).map(|entry| (key, entry)))
                .collect()
        };

        let removed = expired.len();
        for (key, entry) in expired {
            warn!(
                call = %key,
                elapsed_ms = now.duration_since(entry.recorded_at).as_millis(),
                ttl_ms = self.entry_ttl.as_millis(),
                "Expiring unanswered forwarded call"
            );
            (entry.callback)(Err(RpcError::timeout(key.procedure.clone())));
        }
        self.stats
            .expired
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn contains(&self, key: &CallKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Entries in flight for one socket.
    pub fn pending_for(&self, socket_id: &SocketId) -> usize {
        self.entries
            .lock()
            .keys()
            .filter(|key| &key.socket_id == socket_id)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn entry_ttl(&self) -> Duration {
        self.entry_ttl
    }

    pub fn stats(&self) -> &LedgerStats {
        &self.stats
    }
}

impl fmt::Debug for CallLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallLedger")
            .field("in_flight", &self.len())
            .field("entry_ttl", &self.entry_ttl)
            .finish()
    }
}

/// Background task failing expired ledger entries.
pub async fn cleanup_task(ledger: Arc<CallLedger>, interval: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        let removed = ledger.remove_expired();
        if removed > 0 {
            debug!(removed = removed, "Cleaned up expired forwarded calls");
        }
    }
}
