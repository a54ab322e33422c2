//! Topology builder: one master, any number of workers, clients on
//! in-memory sockets.

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::task::JoinHandle;
use wamp_bus::InMemoryProcessBus;
use wamp_gateway::{
    rpc_handler, GatewayConfig, MasterResponder, MasterServer, MemoryServer, MemorySocket,
    WampClient, WampSocket, WorkerServer, WorkerTasks,
};
use wamp_telemetry::{init_tracing, TelemetryConfig};
use wamp_types::WorkerId;

static LOGGING: Once = Once::new();

/// Install the subscriber once per test binary. Output only with
/// `WAMP_TEST_LOGS` set.
pub fn init_logging() {
    LOGGING.call_once(|| {
        let config = TelemetryConfig {
            console_output: std::env::var("WAMP_TEST_LOGS").is_ok(),
            ..TelemetryConfig::from_env()
        };
        let _ = init_tracing(&config);
    });
}

/// Master responders parked by the `park` procedure.
pub type Parked = Arc<Mutex<Vec<MasterResponder>>>;

pub struct Worker {
    pub server: Arc<WorkerServer>,
    pub transport: MemoryServer,
    tasks: WorkerTasks,
}

impl Worker {
    /// Open a client connection and upgrade the server side.
    pub fn connect(&self, client: &WampClient) -> (WampSocket, Arc<MemorySocket>) {
        let (client_side, server_side) = self.transport.connect();
        self.server.upgrade_socket(server_side);
        (client.upgrade(client_side.clone()), client_side)
    }
}

pub struct Topology {
    pub bus: Arc<InMemoryProcessBus>,
    pub master: Arc<MasterServer>,
    pub workers: Vec<Worker>,
    pub parked: Parked,
    master_task: JoinHandle<()>,
}

impl Topology {
    /// Master serving `getUser`, `fail` and `park`, plus `worker_count`
    /// started workers.
    pub async fn start(worker_count: u32, config: GatewayConfig) -> Self {
        init_logging();
        let (bus, master_inbox) = InMemoryProcessBus::new();
        let master = MasterServer::new(bus.clone());
        let parked: Parked = Arc::new(Mutex::new(Vec::new()));
        let park = parked.clone();

        master.register_rpc_endpoints([
            (
                "getUser",
                rpc_handler(|data: Value, responder: MasterResponder| {
                    responder.ok(json!({"name": "X", "id": data["id"]}));
                }),
            ),
            (
                "fail",
                rpc_handler(|_, responder: MasterResponder| {
                    responder.err(wamp_types::RpcError::server_error("boom"));
                }),
            ),
            (
                "park",
                rpc_handler(move |_, responder: MasterResponder| park.lock().push(responder)),
            ),
        ]);
        master.set_config(map(json!({"network": "test"})));
        let master_task = tokio::spawn(Arc::clone(&master).run(master_inbox));

        let mut workers = Vec::new();
        for n in 1..=worker_count {
            let (link, inbox) = bus
                .attach_worker(WorkerId(n))
                .expect("worker ids are unique");
            let transport = MemoryServer::new();
            let server = WorkerServer::new(Arc::new(link), transport.table().clone(), &config);
            let mut updates = server.config().subscribe();
            let tasks = server.start(inbox).expect("bus is open");

            tokio::time::timeout(Duration::from_secs(5), updates.changed())
                .await
                .expect("worker configured in time")
                .expect("config sender alive");

            workers.push(Worker {
                server,
                transport,
                tasks,
            });
        }

        Self {
            bus,
            master,
            workers,
            parked,
            master_task,
        }
    }

    pub fn worker(&self, n: usize) -> &Worker {
        &self.workers[n]
    }

    /// Wait until the master has parked `count` calls.
    pub async fn wait_parked(&self, count: usize) {
        for _ in 0..500 {
            if self.parked.lock().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("master never parked {count} calls");
    }
}

impl Drop for Topology {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.tasks.abort();
        }
        self.master_task.abort();
    }
}

pub fn map(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// Let in-flight frames and bus messages land.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
