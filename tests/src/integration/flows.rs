//! # Socket Flows
//!
//! Client and server roles talking directly, without a master: local
//! dispatch, events in both directions, malformed frames and upgrade rules.

#[cfg(test)]
mod tests {
    use crate::integration::harness::settle;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use wamp_gateway::{
        event_handler, rpc_handler, CallError, ClientConfig, MemoryServer, Responder, Socket,
        WampClient, WampServer,
    };
    use wamp_types::{codes, RPC_REQUEST_EVENT};

    fn served() -> (Arc<WampServer>, MemoryServer) {
        let server = WampServer::new();
        server.register_rpc_endpoints([(
            "add",
            rpc_handler(|data: Value, responder: Responder| {
                let sum = data["a"].as_i64().unwrap_or(0) + data["b"].as_i64().unwrap_or(0);
                responder.ok(json!(sum));
            }),
        )]);
        (server, MemoryServer::new())
    }

    #[tokio::test]
    async fn test_many_sockets_share_one_registry() {
        let (server, transport) = served();
        let client = WampClient::default();

        let mut sockets = Vec::new();
        for _ in 0..4 {
            let (client_side, server_side) = transport.connect();
            assert!(server.upgrade_socket(server_side));
            sockets.push(client.upgrade(client_side));
        }
        assert_eq!(server.upgraded_count(), 4);
        assert_eq!(transport.table().len(), 4);

        for (n, wamp) in sockets.iter().enumerate() {
            let n = n as i64;
            let sum = wamp.call("add", json!({"a": n, "b": 10})).await.unwrap();
            assert_eq!(sum, json!(n + 10));
        }
    }

    #[tokio::test]
    async fn test_upgrade_is_idempotent() {
        let (server, transport) = served();
        let (client_side, server_side) = transport.connect();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        server.register_rpc_endpoints([(
            "count",
            rpc_handler(move |_, responder: Responder| {
                counter.fetch_add(1, Ordering::SeqCst);
                responder.ok(Value::Null);
            }),
        )]);

        assert!(server.upgrade_socket(server_side.clone()));
        assert!(!server.upgrade_socket(server_side));

        let wamp = WampClient::default().upgrade(client_side);
        wamp.call("count", json!(null)).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_event_published_by_client_reaches_handler() {
        let (server, transport) = served();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        server.register_event_endpoints([(
            "telemetry",
            event_handler(move |data| sink.lock().push(data)),
        )]);
        let (client_side, server_side) = transport.connect();
        server.upgrade_socket(server_side);

        let wamp = WampClient::default().upgrade(client_side);
        wamp.publish("telemetry", json!({"cpu": 3})).unwrap();
        settle().await;

        assert_eq!(*seen.lock(), vec![json!({"cpu": 3})]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_called_as_rpc_gets_no_answer() {
        let (server, transport) = served();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        server.register_event_endpoints([(
            "audit",
            event_handler(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )]);
        let (client_side, server_side) = transport.connect();
        server.upgrade_socket(server_side);

        let client = WampClient::new(&ClientConfig {
            max_calls_per_procedure: 10,
            request_timeout_ms: 1_000,
        });
        let outcome = client.upgrade(client_side).call("audit", json!(null)).await;

        assert!(matches!(
            outcome,
            Err(CallError::NoResponse { .. }) | Err(CallError::Timeout { .. })
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let (server, transport) = served();
        let (client_side, server_side) = transport.connect();
        server.upgrade_socket(server_side);

        client_side
            .emit(RPC_REQUEST_EVENT, json!({"type": "rpcRequest"}), None)
            .unwrap();
        client_side
            .emit(RPC_REQUEST_EVENT, json!("not an object"), None)
            .unwrap();
        settle().await;

        // The socket stays usable after garbage.
        let wamp = WampClient::default().upgrade(client_side);
        assert_eq!(wamp.call("add", json!({"a": 1, "b": 2})).await.unwrap(), json!(3));
    }

    #[tokio::test]
    async fn test_reassigned_handler_serves_next_call() {
        let (server, transport) = served();
        let (client_side, server_side) = transport.connect();
        server.upgrade_socket(server_side);
        let wamp = WampClient::default().upgrade(client_side);

        assert_eq!(wamp.call("add", json!({"a": 1, "b": 1})).await.unwrap(), json!(2));
        server.reassign_rpc_endpoints([(
            "add",
            rpc_handler(|_, responder: Responder| {
                responder.ok(json!("replaced"));
            }),
        )]);
        assert_eq!(
            wamp.call("add", json!({"a": 1, "b": 1})).await.unwrap(),
            json!("replaced")
        );
    }

    #[tokio::test]
    async fn test_unregistered_on_plain_server_lists_procedures() {
        let (server, transport) = served();
        let (client_side, server_side) = transport.connect();
        server.upgrade_socket(server_side);

        let outcome = WampClient::default()
            .upgrade(client_side)
            .call("sub", json!(null))
            .await;
        match outcome {
            Err(CallError::Rejected(error)) => {
                assert_eq!(error.code, codes::PROCEDURE_NOT_FOUND);
                assert!(error.message.contains("add"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_disconnect_forgets_upgrade() {
        let (server, transport) = served();
        let (client_side, server_side) = transport.connect();
        let id = server_side.id().clone();
        server.upgrade_socket(server_side);
        assert!(server.is_upgraded(&id));

        client_side.disconnect();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!server.is_upgraded(&id));
        assert!(transport.table().is_empty());
    }
}
