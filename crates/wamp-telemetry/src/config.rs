//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for process logging.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to log output
    pub service_name: String,

    /// Process role (master, worker-3, ...)
    pub role: String,

    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Whether to enable console output
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "wamp-gateway".to_string(),
            role: "master".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `WAMP_SERVICE_NAME`: Service name (default: wamp-gateway)
    /// - `WAMP_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `WAMP_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `WAMP_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("WAMP_SERVICE_NAME")
                .unwrap_or_else(|_| "wamp-gateway".to_string()),

            role: "master".to_string(),

            log_level: env::var("WAMP_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("WAMP_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            json_logs: env::var("WAMP_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),
        }
    }

    /// Configuration for a worker process.
    pub fn for_worker(worker_id: u32) -> Self {
        let mut config = Self::from_env();
        config.role = format!("worker-{}", worker_id);
        config
    }

    /// Service name including the process role.
    pub fn full_service_name(&self) -> String {
        format!("{}-{}", self.service_name, self.role)
    }
}
