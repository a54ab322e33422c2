//! # Call Gateway
//!
//! Turns `call(procedure, data)` into an outbound `rpc-request` frame and a
//! pending result.
//!
//! Flow:
//! 1. Reserve a slot for the procedure (refused at the ceiling, nothing sent)
//! 2. Emit the request frame with an acknowledgement callback
//! 3. Await the acknowledgement or the deadline, fixed when the frame left
//! 4. Release the slot, whatever the outcome
//!
//! Steps 1 and 2 run when `call` is invoked, not when the returned future is
//! first polled, so calls leave in the order they were made.

use crate::domain::config::ClientConfig;
use crate::domain::error::CallError;
use crate::domain::pending::PendingCalls;
use crate::transport::{Ack, Socket};
use futures::future::{self, BoxFuture, FutureExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;
use wamp_types::{Request, Response, SocketId, RPC_REQUEST_EVENT, RPC_RESPONSE_EVENT};

/// Client role. Counters are shared by every socket it upgrades.
#[derive(Debug, Clone)]
pub struct WampClient {
    pending: Arc<PendingCalls>,
    timeout: Duration,
}

impl WampClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            pending: PendingCalls::new(config.max_calls_per_procedure),
            timeout: config.request_timeout(),
        }
    }

    /// Wrap a connected socket with the call API.
    pub fn upgrade(&self, socket: Arc<dyn Socket>) -> WampSocket {
        WampSocket {
            socket,
            pending: Arc::clone(&self.pending),
            timeout: self.timeout,
        }
    }

    pub fn pending(&self) -> &PendingCalls {
        &self.pending
    }
}

impl Default for WampClient {
    fn default() -> Self {
        Self::new(&ClientConfig::default())
    }
}

/// A socket upgraded for outbound calls.
#[derive(Clone)]
pub struct WampSocket {
    socket: Arc<dyn Socket>,
    pending: Arc<PendingCalls>,
    timeout: Duration,
}

impl WampSocket {
    pub fn id(&self) -> &SocketId {
        self.socket.id()
    }

    pub fn socket(&self) -> &Arc<dyn Socket> {
        &self.socket
    }

    /// Invoke `procedure` on the peer.
    ///
    /// Fails immediately with [`CallError::CapacityExceeded`] when the
    /// procedure already has the maximum number of calls outstanding.
    pub fn call(
        &self,
        procedure: &str,
        data: Value,
    ) -> BoxFuture<'static, Result<Value, CallError>> {
        let guard = match self.pending.try_acquire(procedure) {
            Ok(guard) => guard,
            Err(e) => return future::ready(Err(e)).boxed(),
        };

        let payload = match serde_json::to_value(Request::rpc(procedure, data)) {
            Ok(payload) => payload,
            Err(e) => return future::ready(Err(CallError::Encode(e.to_string()))).boxed(),
        };

        let timeout = self.timeout;
        let deadline = Instant::now() + timeout;
        let (tx, rx) = oneshot::channel();
        let ack = Ack::new(move |answer| {
            let _ = tx.send(answer);
        });
        if let Err(e) = self.socket.emit(RPC_REQUEST_EVENT, payload, Some(ack)) {
            return future::ready(Err(CallError::Transport(e))).boxed();
        }

        debug!(socket_id = %self.socket.id(), procedure, "Call sent");

        let procedure = procedure.to_string();
        async move {
            let _guard = guard;
            match tokio::time::timeout_at(deadline, rx).await {
                Ok(Ok(answer)) => {
                    let response: Response = serde_json::from_value(answer)
                        .map_err(|e| CallError::MalformedResponse(e.to_string()))?;
                    response.into_result().map_err(CallError::Rejected)
                }
                Ok(Err(_)) => Err(CallError::NoResponse { procedure }),
                Err(_) => {
                    debug!(procedure = %procedure, timeout_ms = timeout.as_millis(), "Call timed out");
                    Err(CallError::Timeout {
                        procedure,
                        after: timeout,
                    })
                }
            }
        }
        .boxed()
    }

    /// Emit an event. No answer is expected.
    pub fn publish(&self, event: &str, data: Value) -> Result<(), CallError> {
        self.socket.emit(event, data, None)?;
        Ok(())
    }

    /// Receive responses the peer pushes without a pending call.
    ///
    /// Replies to [`WampSocket::call`] arrive through the acknowledgement
    /// and never reach this hook. Frames that do not decode as a response
    /// are dropped.
    pub fn on_response<F>(&self, handler: F)
    where
        F: Fn(Response) + Send + Sync + 'static,
    {
        let socket_id = self.socket.id().clone();
        self.socket.on(
            RPC_RESPONSE_EVENT,
            Arc::new(move |payload, _ack| match serde_json::from_value(payload) {
                Ok(response) => handler(response),
                Err(e) => debug!(socket_id = %socket_id, error = %e, "Dropping malformed pushed response"),
            }),
        );
    }

    /// Subscribe to events the peer publishes under `event`.
    pub fn subscribe<F>(&self, event: &str, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.socket
            .on(event, Arc::new(move |payload, _ack| handler(payload)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::rpc_handler;
    use crate::server::{Responder, WampServer};
    use crate::transport::memory::{self, MemorySocket};
    use parking_lot::Mutex;
    use serde_json::json;
    use wamp_types::codes;

    fn config(max: usize, timeout_ms: u64) -> ClientConfig {
        ClientConfig {
            max_calls_per_procedure: max,
            request_timeout_ms: timeout_ms,
        }
    }

    /// Server with `echo` and a `park` procedure that never answers.
    fn served() -> (Arc<MemorySocket>, Arc<Mutex<Vec<Responder>>>) {
        let server = WampServer::new();
        let parked = Arc::new(Mutex::new(Vec::new()));
        let park = parked.clone();
        server.register_rpc_endpoints([
            (
                "echo",
                rpc_handler(|data, responder: Responder| {
                    responder.ok(data);
                }),
            ),
            (
                "park",
                rpc_handler(move |_, responder: Responder| park.lock().push(responder)),
            ),
        ]);

        let (client, server_side) = memory::pair(SocketId::generate());
        server.upgrade_socket(server_side);
        (client, parked)
    }

    #[tokio::test]
    async fn test_call_resolves_with_handler_data() {
        let (socket, _parked) = served();
        let client = WampClient::default();
        let wamp = client.upgrade(socket);

        let data = wamp.call("echo", json!({"id": 7})).await.unwrap();
        assert_eq!(data, json!({"id": 7}));
        assert_eq!(client.pending().outstanding("echo"), 0);
    }

    #[tokio::test]
    async fn test_unregistered_call_is_rejected() {
        let (socket, _parked) = served();
        let wamp = WampClient::default().upgrade(socket);

        match wamp.call("missing", json!(null)).await {
            Err(CallError::Rejected(error)) => assert_eq!(error.code, codes::PROCEDURE_NOT_FOUND),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_call_over_ceiling_sends_nothing() {
        let (socket, parked) = served();
        let client = WampClient::new(&config(2, 10_000));
        let wamp = client.upgrade(socket.clone());

        let first = wamp.call("park", json!(1));
        let second = wamp.call("park", json!(2));
        let sent = socket.frames_sent();

        let third = wamp.call("park", json!(3)).await;
        assert!(matches!(
            third,
            Err(CallError::CapacityExceeded { limit: 2, .. })
        ));
        assert_eq!(socket.frames_sent(), sent);
        assert_eq!(client.pending().outstanding("park"), 2);

        tokio::time::sleep(Duration::from_millis(10)).await;
        for responder in parked.lock().drain(..) {
            responder.ok(json!("done"));
        }
        assert_eq!(first.await.unwrap(), json!("done"));
        assert_eq!(second.await.unwrap(), json!("done"));
        assert_eq!(client.pending().tracked_procedures(), 0);
    }

    #[tokio::test]
    async fn test_ceiling_is_shared_across_sockets() {
        let (a, _pa) = served();
        let (b, _pb) = served();
        let client = WampClient::new(&config(1, 10_000));

        let _pending = client.upgrade(a).call("park", json!(null));
        let refused = client.upgrade(b).call("park", json!(null)).await;
        assert!(matches!(refused, Err(CallError::CapacityExceeded { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_times_out_and_releases_slot() {
        let (socket, _parked) = served();
        let client = WampClient::new(&config(1, 500));
        let wamp = client.upgrade(socket);

        let outcome = wamp.call("park", json!(null)).await;
        assert!(matches!(outcome, Err(CallError::Timeout { .. })));
        assert_eq!(client.pending().outstanding("park"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_from_send_not_first_poll() {
        let (socket, _parked) = served();
        let client = WampClient::new(&config(1, 500));
        let wamp = client.upgrade(socket);

        let call = wamp.call("park", json!(null));
        tokio::time::advance(Duration::from_millis(600)).await;

        match call.now_or_never() {
            Some(Err(CallError::Timeout { .. })) => {}
            other => panic!("expected an elapsed deadline, got {other:?}"),
        }
        assert_eq!(client.pending().outstanding("park"), 0);
    }

    #[tokio::test]
    async fn test_call_on_closed_socket() {
        let (socket, _parked) = served();
        socket.disconnect();
        let client = WampClient::default();

        let outcome = client.upgrade(socket).call("echo", json!(null)).await;
        assert!(matches!(outcome, Err(CallError::Transport(_))));
        assert_eq!(client.pending().outstanding("echo"), 0);
    }

    #[tokio::test]
    async fn test_pushed_response_reaches_hook() {
        let (client_side, server_side) = memory::pair(SocketId::from("s1"));
        let wamp = WampClient::default().upgrade(client_side);

        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        wamp.on_response(move |response| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(response);
            }
        });

        server_side
            .emit(RPC_RESPONSE_EVENT, json!("garbage"), None)
            .unwrap();
        let pushed = Response::for_request(&Request::rpc("notice", json!(null)), Ok(json!(1)));
        server_side
            .emit(RPC_RESPONSE_EVENT, serde_json::to_value(&pushed).unwrap(), None)
            .unwrap();

        let response = rx.await.unwrap();
        assert_eq!(response.procedure, "notice");
        assert_eq!(response.into_result().unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_publish_and_subscribe() {
        let (client_side, server_side) = memory::pair(SocketId::from("s1"));
        let client = WampClient::default();
        let ours = client.upgrade(client_side);
        let theirs = client.upgrade(server_side);

        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        theirs.subscribe("news", move |data| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(data);
            }
        });

        ours.publish("news", json!({"headline": "x"})).unwrap();
        assert_eq!(rx.await.unwrap()["headline"], "x");
    }
}
