//! Gateway configuration with validation.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main gateway configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Call gateway (client role) limits
    pub client: ClientConfig,
    /// Inter-process call ledger (worker role)
    pub ledger: LedgerConfig,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.max_calls_per_procedure == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_calls_per_procedure cannot be 0".into(),
            ));
        }

        if self.client.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "request_timeout_ms cannot be 0".into(),
            ));
        }

        if self.ledger.entry_ttl_ms == 0 || self.ledger.sweep_interval_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "ledger ttl and sweep interval cannot be 0".into(),
            ));
        }

        // A ledger entry must outlive the client waiting on it.
        if self.ledger.entry_ttl_ms < self.client.request_timeout_ms {
            return Err(ConfigError::InvalidTimeout(format!(
                "ledger entry_ttl_ms ({}) is shorter than request_timeout_ms ({})",
                self.ledger.entry_ttl_ms, self.client.request_timeout_ms
            )));
        }

        Ok(())
    }

    /// Load from environment variables, falling back to defaults.
    ///
    /// # Environment Variables
    ///
    /// - `WAMP_MAX_CALLS_PER_PROCEDURE` (default: 100)
    /// - `WAMP_REQUEST_TIMEOUT_MS` (default: 10000)
    /// - `WAMP_LEDGER_TTL_MS` (default: 60000)
    /// - `WAMP_LEDGER_SWEEP_MS` (default: 5000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = parse_env("WAMP_MAX_CALLS_PER_PROCEDURE")? {
            config.client.max_calls_per_procedure = value as usize;
        }
        if let Some(value) = parse_env("WAMP_REQUEST_TIMEOUT_MS")? {
            config.client.request_timeout_ms = value;
        }
        if let Some(value) = parse_env("WAMP_LEDGER_TTL_MS")? {
            config.ledger.entry_ttl_ms = value;
        }
        if let Some(value) = parse_env("WAMP_LEDGER_SWEEP_MS")? {
            config.ledger.sweep_interval_ms = value;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_env(key: &'static str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value: raw }),
        Err(_) => Ok(None),
    }
}

/// Client-side call limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Outstanding calls allowed per procedure before new calls are rejected
    pub max_calls_per_procedure: usize,
    /// Time a call waits for its response
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_calls_per_procedure: 100,
            request_timeout_ms: 10_000,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Inter-process call ledger settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Age after which an unanswered forwarded call is failed with a timeout
    pub entry_ttl_ms: u64,
    /// How often expired entries are swept
    pub sweep_interval_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            entry_ttl_ms: 60_000,
            sweep_interval_ms: 5_000,
        }
    }
}

impl LedgerConfig {
    pub fn entry_ttl(&self) -> Duration {
        Duration::from_millis(self.entry_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Environment variable that does not parse
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: &'static str, value: String },
}
