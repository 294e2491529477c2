use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::net::TcpListener;

use crate::backend::{BackendRegistry, SwitchController, VersionStore};
use crate::config::Config;
use crate::metrics::RequestCounters;
use crate::proxy::connection::ConnectionCounter;
use crate::proxy::health::{HealthGate, HttpHealthGate};
use crate::proxy::pool::ProxyPool;
use crate::proxy::router::{build_router, AppState};
use crate::proxy::shutdown::ShutdownManager;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("bind() must be called before run()")]
    NotBound,

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

pub struct ProxyServer {
    pub addr: SocketAddr,
    /// The bound listener. Populated by bind(), consumed by run().
    listener: Option<TcpListener>,
    state: AppState,
    shutdown: Arc<ShutdownManager>,
    drain_timeout: Duration,
}

impl ProxyServer {
    /// Build the server with an HTTP health gate.
    ///
    /// The routing state is seeded from `store`, falling back to the
    /// configured default version.
    pub fn new(config: &Config, store: Arc<dyn VersionStore>) -> Result<Self, ServerError> {
        let gate = Arc::new(HttpHealthGate::new(&config.health)?);
        Self::with_gate(config, store, gate)
    }

    pub fn with_gate(
        config: &Config,
        store: Arc<dyn VersionStore>,
        gate: Arc<dyn HealthGate>,
    ) -> Result<Self, ServerError> {
        let registry = BackendRegistry::seeded(
            config.backends.clone(),
            config.routing.active_version,
            store.load(),
        );
        let pool = Arc::new(ProxyPool::new(&config.transport)?);
        let switch = Arc::new(SwitchController::new(registry.clone(), gate, store));

        let state = AppState {
            registry,
            pool,
            counters: Arc::new(RequestCounters::new()),
            switch,
            started_at: Instant::now(),
        };

        Ok(Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)), // Determined at bind time
            listener: None,
            state,
            shutdown: Arc::new(ShutdownManager::new()),
            drain_timeout: Duration::from_secs(config.server.shutdown_timeout_seconds as u64),
        })
    }

    /// Bind the listener. Failure here is fatal for the process.
    pub async fn bind(&mut self, addr: &str) -> Result<SocketAddr, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let actual_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        self.addr = actual_addr;
        self.listener = Some(listener);
        tracing::info!("Proxy bound to {}", actual_addr);
        Ok(actual_addr)
    }

    pub fn registry(&self) -> BackendRegistry {
        self.state.registry.clone()
    }

    pub fn counters(&self) -> Arc<RequestCounters> {
        self.state.counters.clone()
    }

    pub fn pool(&self) -> Arc<ProxyPool> {
        self.state.pool.clone()
    }

    pub fn switch_controller(&self) -> Arc<SwitchController> {
        self.state.switch.clone()
    }

    pub fn shutdown_handle(&self) -> Arc<ShutdownManager> {
        self.shutdown.clone()
    }

    pub fn handle(&self) -> ProxyHandle {
        ProxyHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Run the proxy server until shutdown is signalled.
    ///
    /// Consumes self to take ownership of the pre-bound listener. After the
    /// signal, open connections get `shutdown_timeout_seconds` to finish;
    /// any still open at the deadline are abandoned to the runtime.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = self.listener.ok_or(ServerError::NotBound)?;

        let current = self.state.registry.snapshot();
        tracing::info!(
            addr = %self.addr,
            version = %current.version,
            backend = %current.backend,
            "Starting proxy server"
        );

        let app = build_router(self.state);
        let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
        let make_service = ConnectionCounter::new(make_service, self.shutdown.clone());

        let shutdown = self.shutdown.clone();
        let serve = axum::serve(listener, make_service)
            .with_graceful_shutdown(async move {
                shutdown.wait_for_shutdown().await;
            })
            .into_future();

        // Graceful serve only resolves once every connection has closed.
        let shutdown = self.shutdown.clone();
        let drain_timeout = self.drain_timeout;
        let drain_deadline = async move {
            shutdown.shutdown_requested().await;
            tokio::time::sleep(drain_timeout).await;
        };

        tokio::select! {
            result = serve => {
                result.map_err(ServerError::Serve)?;
                tracing::info!("Shut down gracefully");
            }
            _ = drain_deadline => {
                tracing::warn!(
                    remaining = self.shutdown.active_connections(),
                    timeout_secs = drain_timeout.as_secs(),
                    "Forced shutdown after drain timeout"
                );
            }
        }

        Ok(())
    }
}

/// Cloneable handle for stopping a running server.
#[derive(Clone)]
pub struct ProxyHandle {
    shutdown: Arc<ShutdownManager>,
}

impl ProxyHandle {
    pub fn shutdown(&self) {
        self.shutdown.signal_shutdown();
    }
}
