//! Configuration pushed from the master.
//!
//! The worker holds one [`ConfigSnapshot`] at a time. Every push is merged
//! shallowly into the current snapshot (pushed keys win) and the result
//! replaces it under a new version. Readers clone an `Arc` and never see a
//! half-applied push.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Immutable view of the configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSnapshot {
    /// Zero until the first push; incremented by one per push.
    pub version: u64,
    pub values: Map<String, Value>,
}

impl ConfigSnapshot {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Shallow merge of `push` on top of this snapshot.
    pub fn merged(&self, push: &Map<String, Value>) -> Self {
        let mut values = self.values.clone();
        for (key, value) in push {
            values.insert(key.clone(), value.clone());
        }
        Self {
            version: self.version + 1,
            values,
        }
    }
}

/// Invoked once, with the first applied snapshot.
pub type ConfiguredCallback = Box<dyn FnOnce(&ConfigSnapshot) + Send>;

/// Holds the current snapshot and notifies on change.
pub struct ConfigSync {
    current: watch::Sender<Arc<ConfigSnapshot>>,
    on_configured: Mutex<Option<ConfiguredCallback>>,
}

impl ConfigSync {
    pub fn new() -> Self {
        let (current, _) = watch::channel(Arc::new(ConfigSnapshot::default()));
        Self {
            current,
            on_configured: Mutex::new(None),
        }
    }

    /// Run `callback` when the first push lands, or now if it already has.
    pub fn on_configured(&self, callback: ConfiguredCallback) {
        let mut slot = self.on_configured.lock();
        let snapshot = self.current();
        if snapshot.version == 0 {
            *slot = Some(callback);
            return;
        }
        drop(slot);
        callback(&snapshot);
    }

    /// Merge a push and publish the new snapshot.
    pub fn apply(&self, push: &Map<String, Value>) -> Arc<ConfigSnapshot> {
        let mut applied: Arc<ConfigSnapshot> = Arc::default();
        self.current.send_modify(|current| {
            *current = Arc::new(current.merged(push));
            applied = Arc::clone(current);
        });

        debug!(
            version = applied.version,
            keys = push.len(),
            "Applied configuration push"
        );

        if applied.version == 1 {
            info!("Worker configured");
            let callback = self.on_configured.lock().take();
            if let Some(callback) = callback {
                callback(&applied);
            }
        }
        applied
    }

    pub fn current(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&*self.current.borrow())
    }

    /// Receiver that observes every future snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ConfigSnapshot>> {
        self.current.subscribe()
    }

    pub fn is_configured(&self) -> bool {
        self.current.borrow().version > 0
    }
}

impl Default for ConfigSync {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConfigSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSync")
            .field("version", &self.current.borrow().version)
            .finish()
    }
}
