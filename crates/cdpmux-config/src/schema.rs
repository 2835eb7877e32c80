//! Configuration schema definitions.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub relay: RelaySettings,

    #[serde(default)]
    pub log: LogConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9223
}

/// Relay behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Bearer token required from CDP clients. No token means loopback-only
    /// admission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,

    /// Origins accepted on the extension endpoint
    /// (e.g. `chrome-extension://<id>`).
    #[serde(default)]
    pub extension_allowed_origins: Vec<String>,

    /// Deadline for a forwarded command before the client gets a timeout
    /// error.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Capacity of each per-socket write queue.
    #[serde(default = "default_write_queue_capacity")]
    pub write_queue_capacity: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            bearer_token: None,
            extension_allowed_origins: Vec::new(),
            request_timeout_ms: default_request_timeout_ms(),
            write_queue_capacity: default_write_queue_capacity(),
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_write_queue_capacity() -> usize {
    256
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Directory for rolling log files. Console-only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: None,
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
