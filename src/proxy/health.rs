//! Pre-switch backend probing.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::config::HealthConfig;

/// Decides whether a backend may receive traffic.
#[async_trait]
pub trait HealthGate: Send + Sync {
    /// One bounded, non-retrying check of `backend`.
    async fn probe(&self, backend: &str) -> bool;
}

/// Probes a backend with a single GET to its base URI.
///
/// Exactly 200 is healthy. Any other status, transport error or timeout is
/// unhealthy. Uses its own client so probes neither share connection-pool
/// slots nor timeouts with steady-state traffic.
pub struct HttpHealthGate {
    client: Client,
}

impl HttpHealthGate {
    pub fn new(config: &HealthConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HealthGate for HttpHealthGate {
    async fn probe(&self, backend: &str) -> bool {
        match self.client.get(backend).send().await {
            Ok(resp) if resp.status() == StatusCode::OK => {
                tracing::info!(backend = %backend, status = resp.status().as_u16(), "Health probe passed");
                true
            }
            Ok(resp) => {
                tracing::warn!(backend = %backend, status = resp.status().as_u16(), "Health probe failed");
                false
            }
            Err(e) => {
                tracing::warn!(backend = %backend, error = %e, "Health probe failed");
                false
            }
        }
    }
}
