//! Shared test utilities and mock infrastructure.

#![allow(dead_code)]

pub mod mock_backend;

use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use traffic_switch::backend::{BackendRegistry, FileVersionStore, VersionStore};
use traffic_switch::config::Config;
use traffic_switch::metrics::RequestCounters;
use traffic_switch::proxy::{ProxyHandle, ProxyPool, ProxyServer};

/// Find an available port for testing.
///
/// Nothing listens on the port afterwards, so it also serves as a
/// "connection refused" backend.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to free port");
    listener.local_addr().unwrap().port()
}

pub fn refused_backend() -> String {
    format!("http://127.0.0.1:{}", free_port())
}

/// Config for two backends with short timeouts, state file in `state_dir`.
pub fn test_config(v1: &str, v2: &str, state_dir: &TempDir) -> Config {
    let mut config = Config::with_backends(v1, v2);
    config.server.bind_addr = "127.0.0.1:0".to_string();
    config.server.shutdown_timeout_seconds = 1;
    config.routing.state_file = state_dir.path().join(".version");
    config.transport.response_header_timeout_seconds = 5;
    config.health.timeout_seconds = 2;
    config.health.connect_timeout_seconds = 1;
    config
}

/// Create a temporary TOML config file.
pub fn temp_config_file(v1: &str, v2: &str, active: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("config.toml");
    let content = format!(
        r#"[server]
bind_addr = "127.0.0.1:0"

[backends]
v1 = "{v1}"
v2 = "{v2}"

[routing]
active_version = "{active}"
state_file = "{state}"
"#,
        state = temp_dir.path().join(".version").display(),
    );
    std::fs::write(&config_path, content).expect("Failed to write config");
    (temp_dir, config_path)
}

/// A proxy running on an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub handle: ProxyHandle,
    pub registry: BackendRegistry,
    pub counters: Arc<RequestCounters>,
    pub pool: Arc<ProxyPool>,
}

impl TestProxy {
    pub async fn start(config: &Config) -> Self {
        let store: Arc<dyn VersionStore> =
            Arc::new(FileVersionStore::new(config.routing.state_file.clone()));
        Self::start_with_store(config, store).await
    }

    pub async fn start_with_store(config: &Config, store: Arc<dyn VersionStore>) -> Self {
        let mut server = ProxyServer::new(config, store).expect("Failed to create proxy server");
        let addr = server
            .bind(&config.server.bind_addr)
            .await
            .expect("Failed to bind");

        let proxy = Self {
            addr,
            handle: server.handle(),
            registry: server.registry(),
            counters: server.counters(),
            pool: server.pool(),
        };

        tokio::spawn(async move {
            let _ = server.run().await;
        });
        assert!(wait_for_server(addr, Duration::from_secs(2)).await);
        proxy
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}

/// Wait for a server to become available.
pub async fn wait_for_server(addr: SocketAddr, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
