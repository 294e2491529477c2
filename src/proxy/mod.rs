//! HTTP surface: the catch-all reverse proxy and the operator endpoints.

pub mod connection;
pub mod control;
pub mod error;
pub mod health;
pub mod pool;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod upstream;

use tracing_subscriber::EnvFilter;

pub use error::{ErrorKind, ProxyError};
pub use health::{HealthGate, HttpHealthGate};
pub use pool::ProxyPool;
pub use server::{ProxyHandle, ProxyServer, ServerError};

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();
}
