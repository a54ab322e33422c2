//! # End-to-End Delegation
//!
//! A client calls a worker for procedures only the master serves. The
//! worker forwards with a fresh signature, the master answers over the bus,
//! and the ledger routes the answer back to the calling socket.
//!
//! ```text
//! client ──rpc-request──→ worker ──interProcessRpcRequest──→ master
//! client ←──── ack ────── worker ←─interProcessRpcResponse── master
//! ```

#[cfg(test)]
mod tests {
    use crate::integration::harness::{map, settle, Topology};
    use futures::future::join_all;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;
    use wamp_gateway::{
        event_handler, rpc_handler, worker_rpc_handler, CallError, ClientConfig, GatewayConfig,
        Responder, WampClient,
    };
    use wamp_types::{codes, Request};

    #[tokio::test]
    async fn test_unknown_procedure_resolves_through_master() {
        let topology = Topology::start(1, GatewayConfig::default()).await;
        let worker = topology.worker(0);
        let client = WampClient::default();
        let (wamp, _socket) = worker.connect(&client);

        let data = wamp.call("getUser", json!({"id": 7})).await.unwrap();

        assert_eq!(data, json!({"name": "X", "id": 7}));
        assert!(worker.server.ledger().is_empty());
        assert_eq!(worker.server.ledger().stats().completed.load(Ordering::Relaxed), 1);
        assert_eq!(client.pending().outstanding("getUser"), 0);
    }

    #[tokio::test]
    async fn test_local_procedure_never_reaches_master() {
        let topology = Topology::start(1, GatewayConfig::default()).await;
        let worker = topology.worker(0);
        worker.server.register_rpc_endpoints([(
            "getUser",
            rpc_handler(|_, responder: Responder| {
                responder.ok(json!({"name": "local"}));
            }),
        )]);
        let client = WampClient::default();
        let (wamp, _socket) = worker.connect(&client);

        let data = wamp.call("getUser", json!({"id": 7})).await.unwrap();

        assert_eq!(data["name"], "local");
        assert_eq!(worker.server.ledger().stats().recorded.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_identical_concurrent_calls_resolve_independently() {
        let topology = Topology::start(1, GatewayConfig::default()).await;
        let worker = topology.worker(0);
        let client = WampClient::default();
        let (wamp, _socket) = worker.connect(&client);

        let first = wamp.call("park", json!({"n": 1}));
        let second = wamp.call("park", json!({"n": 2}));
        topology.wait_parked(2).await;
        assert_eq!(worker.server.ledger().len(), 2);

        let mut parked: Vec<_> = topology.parked.lock().drain(..).collect();
        let signatures: Vec<_> = parked
            .iter()
            .map(|r| r.request().signature.clone().unwrap())
            .collect();
        assert_ne!(signatures[0], signatures[1]);

        // Answer in reverse order; each call still gets its own data.
        while let Some(responder) = parked.pop() {
            let n = responder.request().data["n"].clone();
            responder.ok(json!({"echo": n}));
        }

        assert_eq!(first.await.unwrap(), json!({"echo": 1}));
        assert_eq!(second.await.unwrap(), json!({"echo": 2}));
        assert!(worker.server.ledger().is_empty());
    }

    #[tokio::test]
    async fn test_master_error_reaches_client() {
        let topology = Topology::start(1, GatewayConfig::default()).await;
        let client = WampClient::default();
        let (wamp, _socket) = topology.worker(0).connect(&client);

        match wamp.call("fail", json!(null)).await {
            Err(CallError::Rejected(error)) => {
                assert_eq!(error.code, codes::SERVER_ERROR);
                assert_eq!(error.message, "boom");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_procedure_unknown_everywhere_lists_master_procedures() {
        let topology = Topology::start(1, GatewayConfig::default()).await;
        let client = WampClient::default();
        let (wamp, _socket) = topology.worker(0).connect(&client);

        match wamp.call("deleteUser", json!(null)).await {
            Err(CallError::Rejected(error)) => {
                assert_eq!(error.code, codes::PROCEDURE_NOT_FOUND);
                assert!(error.message.contains("getUser"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_disconnect_discards_calls_and_drops_late_answers() {
        let topology = Topology::start(1, GatewayConfig::default()).await;
        let worker = topology.worker(0);
        let client = WampClient::default();
        let (wamp, socket) = worker.connect(&client);

        let _pending = wamp.call("park", json!(null));
        topology.wait_parked(1).await;
        assert_eq!(worker.server.ledger().pending_for(wamp.id()), 1);

        socket.disconnect();
        settle().await;
        assert!(worker.server.ledger().is_empty());
        assert!(worker.server.sockets().is_empty());

        for responder in topology.parked.lock().drain(..) {
            responder.ok(json!("late"));
        }
        settle().await;
        assert_eq!(worker.server.ledger().stats().dropped.load(Ordering::Relaxed), 1);
        assert_eq!(
            worker.server.ledger().stats().disconnected.load(Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn test_answers_route_to_the_forwarding_worker() {
        let topology = Topology::start(2, GatewayConfig::default()).await;
        let client = WampClient::default();
        let (on_first, _a) = topology.worker(0).connect(&client);
        let (on_second, _b) = topology.worker(1).connect(&client);

        let results = join_all([
            on_first.call("getUser", json!({"id": 1})),
            on_second.call("getUser", json!({"id": 2})),
        ])
        .await;

        assert_eq!(results[0].as_ref().unwrap()["id"], 1);
        assert_eq!(results[1].as_ref().unwrap()["id"], 2);
        for worker in &topology.workers {
            assert_eq!(worker.server.ledger().stats().completed.load(Ordering::Relaxed), 1);
        }
    }

    #[tokio::test]
    async fn test_ceiling_applies_to_forwarded_calls() {
        let config = ClientConfig {
            max_calls_per_procedure: 2,
            request_timeout_ms: 10_000,
        };
        let topology = Topology::start(1, GatewayConfig::default()).await;
        let client = WampClient::new(&config);
        let (wamp, socket) = topology.worker(0).connect(&client);

        let first = wamp.call("park", json!(1));
        let second = wamp.call("park", json!(2));
        let sent = socket.frames_sent();

        let refused = wamp.call("park", json!(3)).await;
        assert!(matches!(refused, Err(CallError::CapacityExceeded { limit: 2, .. })));
        assert_eq!(socket.frames_sent(), sent);

        topology.wait_parked(2).await;
        for responder in topology.parked.lock().drain(..) {
            responder.ok(json!("done"));
        }
        assert!(first.await.is_ok());
        assert!(second.await.is_ok());
        assert!(wamp.call("getUser", json!({"id": 1})).await.is_ok());
    }

    #[tokio::test]
    async fn test_worker_rpc_sees_calling_socket() {
        let topology = Topology::start(1, GatewayConfig::default()).await;
        let worker = topology.worker(0);
        worker.server.register_worker_rpc_endpoints([(
            "whoami",
            worker_rpc_handler(|request: Request, responder: Responder| {
                let socket_id = request.socket_id.map(|id| id.to_string());
                responder.ok(json!({"socketId": socket_id, "workerId": request.worker_id}));
            }),
        )]);
        let client = WampClient::default();
        let (wamp, _socket) = worker.connect(&client);

        let data = wamp.call("whoami", json!(null)).await.unwrap();

        assert_eq!(data["socketId"], wamp.id().as_str());
        assert_eq!(data["workerId"], 1);
    }

    #[tokio::test]
    async fn test_worker_code_calls_master_directly() {
        let topology = Topology::start(1, GatewayConfig::default()).await;
        let worker = topology.worker(0);
        let client = WampClient::default();
        let (wamp, _socket) = worker.connect(&client);

        let data = worker
            .server
            .call_master("getUser", json!({"id": 3}), wamp.id())
            .await
            .unwrap();
        assert_eq!(data["id"], 3);
    }

    #[tokio::test]
    async fn test_master_events_become_worker_placeholders() {
        let topology = Topology::start(1, GatewayConfig::default()).await;
        topology
            .master
            .register_event_endpoints([("blocks", event_handler(|_| {}))]);
        topology.master.set_config(map(json!({"network": "main"})));

        let worker = &topology.worker(0).server;
        let mut updates = worker.config().subscribe();
        assert_eq!(topology.master.broadcast_config(), 1);
        tokio::time::timeout(Duration::from_secs(5), updates.changed())
            .await
            .unwrap()
            .unwrap();

        assert!(worker.server().event_names().contains(&"blocks".to_string()));
        let snapshot = worker.config().current();
        assert_eq!(snapshot.version, 2);
        assert_eq!(snapshot.get("network"), Some(&json!("main")));
    }

    #[tokio::test]
    async fn test_worker_is_configured_on_start() {
        let topology = Topology::start(1, GatewayConfig::default()).await;
        let worker = &topology.worker(0).server;

        assert!(worker.config().is_configured());
        assert_eq!(worker.config().current().get("network"), Some(&json!("test")));

        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = fired.clone();
        worker
            .config()
            .on_configured(Box::new(move |_| flag.store(true, Ordering::SeqCst)));
        assert!(fired.load(Ordering::SeqCst));
    }
}
