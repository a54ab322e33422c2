//! # Endpoint Registry
//!
//! Two independent maps: procedure name → RPC handler and event name →
//! event handler. RPC handlers receive the request data and a responder of
//! type `R` through which they answer, now or later; event handlers receive
//! only the data.
//!
//! `register_*` merges into the current map (same names are overwritten);
//! `reassign_*` replaces the whole map.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Handler for a named procedure.
pub type RpcHandler<R> = Arc<dyn Fn(Value, R) + Send + Sync>;

/// Handler for a named event.
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Wrap a closure as an [`RpcHandler`].
pub fn rpc_handler<R, F>(handler: F) -> RpcHandler<R>
where
    F: Fn(Value, R) + Send + Sync + 'static,
{
    Arc::new(handler)
}

/// Wrap a closure as an [`EventHandler`].
pub fn event_handler<F>(handler: F) -> EventHandler
where
    F: Fn(Value) + Send + Sync + 'static,
{
    Arc::new(handler)
}

/// Handler resolved for a name.
pub enum Endpoint<R> {
    Rpc(RpcHandler<R>),
    Event(EventHandler),
}

impl<R> Clone for Endpoint<R> {
    fn clone(&self) -> Self {
        match self {
            Endpoint::Rpc(handler) => Endpoint::Rpc(Arc::clone(handler)),
            Endpoint::Event(handler) => Endpoint::Event(Arc::clone(handler)),
        }
    }
}

impl<R> fmt::Debug for Endpoint<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Rpc(_) => f.write_str("Endpoint::Rpc"),
            Endpoint::Event(_) => f.write_str("Endpoint::Event"),
        }
    }
}

/// Procedure and event handlers of one server.
pub struct EndpointRegistry<R> {
    rpc: HashMap<String, RpcHandler<R>>,
    events: HashMap<String, EventHandler>,
}

impl<R> Default for EndpointRegistry<R> {
    fn default() -> Self {
        Self {
            rpc: HashMap::new(),
            events: HashMap::new(),
        }
    }
}

impl<R> EndpointRegistry<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge procedures into the map.
    pub fn register_rpc<I, S>(&mut self, endpoints: I)
    where
        I: IntoIterator<Item = (S, RpcHandler<R>)>,
        S: Into<String>,
    {
        self.rpc
            .extend(endpoints.into_iter().map(|(name, h)| (name.into(), h)));
    }

    /// Merge events into the map.
    pub fn register_events<I, S>(&mut self, endpoints: I)
    where
        I: IntoIterator<Item = (S, EventHandler)>,
        S: Into<String>,
    {
        self.events
            .extend(endpoints.into_iter().map(|(name, h)| (name.into(), h)));
    }

    /// Replace the procedure map.
    pub fn reassign_rpc<I, S>(&mut self, endpoints: I)
    where
        I: IntoIterator<Item = (S, RpcHandler<R>)>,
        S: Into<String>,
    {
        self.rpc = endpoints
            .into_iter()
            .map(|(name, h)| (name.into(), h))
            .collect();
    }

    /// Replace the event map.
    pub fn reassign_events<I, S>(&mut self, endpoints: I)
    where
        I: IntoIterator<Item = (S, EventHandler)>,
        S: Into<String>,
    {
        self.events = endpoints
            .into_iter()
            .map(|(name, h)| (name.into(), h))
            .collect();
    }

    /// Insert a no-op handler for each name that has no event handler yet.
    ///
    /// Returns how many placeholders were added.
    pub fn register_event_placeholders<I, S>(&mut self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let placeholder: EventHandler = Arc::new(|_: Value| {});
        let mut added = 0;
        for name in names {
            self.events.entry(name.into()).or_insert_with(|| {
                added += 1;
                Arc::clone(&placeholder)
            });
        }
        added
    }

    /// Resolve a name. Procedures shadow events of the same name.
    pub fn resolve(&self, name: &str) -> Option<Endpoint<R>> {
        if let Some(handler) = self.rpc.get(name) {
            return Some(Endpoint::Rpc(Arc::clone(handler)));
        }
        self.events
            .get(name)
            .map(|handler| Endpoint::Event(Arc::clone(handler)))
    }

    pub fn event(&self, name: &str) -> Option<EventHandler> {
        self.events.get(name).cloned()
    }

    pub fn contains_rpc(&self, name: &str) -> bool {
        self.rpc.contains_key(name)
    }

    pub fn contains_event(&self, name: &str) -> bool {
        self.events.contains_key(name)
    }

    /// Registered procedure names, sorted.
    pub fn rpc_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rpc.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered event names, sorted.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.events.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every name a request may resolve to, sorted and deduplicated.
    pub fn known_procedures(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rpc.keys().chain(self.events.keys()).cloned().collect();
        names.sort();
        names.dedup();
        names
    }
}

impl<R> fmt::Debug for EndpointRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("rpc", &self.rpc_names())
            .field("events", &self.event_names())
            .finish()
    }
}
