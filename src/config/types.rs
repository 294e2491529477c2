use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::Version;

/// Root configuration container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub backends: Backends,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the proxy listener (host:port).
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// How long to wait for open connections to drain on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u32,
}

/// The two backend pools traffic can be routed to.
///
/// Loaded once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backends {
    /// Base URI of the v1 pool (e.g. "http://10.0.0.1:8080").
    pub v1: String,
    /// Base URI of the v2 pool.
    pub v2: String,
}

impl Backends {
    /// URI configured for a version label.
    pub fn uri_for(&self, version: Version) -> &str {
        match version {
            Version::V1 => &self.v1,
            Version::V2 => &self.v2,
        }
    }
}

/// Routing defaults and the restart hint location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Version routed to when no valid state file exists.
    #[serde(default)]
    pub active_version: Version,
    /// File holding the last activated version label.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

/// Outbound transport bounds shared by every forward handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Dial timeout in milliseconds (default: 2000).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Time allowed for the backend to return response headers (default: 30).
    #[serde(default = "default_response_header_timeout")]
    pub response_header_timeout_seconds: u32,
    /// Idle pooled connections are closed after this many seconds (default: 300).
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u32,
    /// TCP keepalive interval in seconds (default: 300).
    #[serde(default = "default_tcp_keepalive")]
    pub tcp_keepalive_seconds: u32,
    /// Max idle connections kept per backend (default: 200).
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,
    /// Max in-flight requests per backend (default: 400).
    #[serde(default = "default_max_conns_per_host")]
    pub max_conns_per_host: usize,
    /// Max in-flight requests across all backends (default: 6000).
    #[serde(default = "default_max_conns_total")]
    pub max_conns_total: usize,
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_header_timeout(&self) -> Duration {
        Duration::from_secs(self.response_header_timeout_seconds as u64)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds as u64)
    }

    pub fn tcp_keepalive(&self) -> Duration {
        Duration::from_secs(self.tcp_keepalive_seconds as u64)
    }
}

/// Pre-switch probe settings. Independent of the main transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Total probe timeout in seconds (default: 5).
    #[serde(default = "default_health_timeout")]
    pub timeout_seconds: u32,
    /// Probe dial timeout in seconds (default: 2).
    #[serde(default = "default_health_connect_timeout")]
    pub connect_timeout_seconds: u32,
}

impl HealthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds as u64)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds as u64)
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u32 {
    30
}

fn default_state_file() -> PathBuf {
    PathBuf::from("config/.version")
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_response_header_timeout() -> u32 {
    30
}

fn default_idle_timeout() -> u32 {
    300
}

fn default_tcp_keepalive() -> u32 {
    300
}

fn default_max_idle_per_host() -> usize {
    200
}

fn default_max_conns_per_host() -> usize {
    400
}

fn default_max_conns_total() -> usize {
    6000
}

fn default_health_timeout() -> u32 {
    5
}

fn default_health_connect_timeout() -> u32 {
    2
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            active_version: Version::default(),
            state_file: default_state_file(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            response_header_timeout_seconds: default_response_header_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
            tcp_keepalive_seconds: default_tcp_keepalive(),
            max_idle_per_host: default_max_idle_per_host(),
            max_conns_per_host: default_max_conns_per_host(),
            max_conns_total: default_max_conns_total(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_health_timeout(),
            connect_timeout_seconds: default_health_connect_timeout(),
        }
    }
}

impl Config {
    /// Config with default settings for the given backend pair.
    pub fn with_backends(v1: impl Into<String>, v2: impl Into<String>) -> Self {
        Self {
            server: ServerConfig::default(),
            backends: Backends {
                v1: v1.into(),
                v2: v2.into(),
            },
            routing: RoutingConfig::default(),
            transport: TransportConfig::default(),
            health: HealthConfig::default(),
        }
    }
}
