//! Per-backend forward handle cache.
//!
//! One handle per distinct backend URI, built lazily and never evicted.
//! Its cardinality is bounded by the number of configured backends.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::Client;
use tokio::sync::Semaphore;

use crate::config::TransportConfig;
use crate::proxy::error::ProxyError;
use crate::proxy::upstream::ForwardHandle;

pub struct ProxyPool {
    client: Client,
    handles: RwLock<HashMap<String, Arc<ForwardHandle>>>,
    global_limit: Arc<Semaphore>,
    config: TransportConfig,
}

impl ProxyPool {
    /// Build the pool and its shared outbound transport.
    pub fn new(config: &TransportConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .pool_idle_timeout(config.idle_timeout())
            .pool_max_idle_per_host(config.max_idle_per_host)
            .tcp_keepalive(config.tcp_keepalive())
            .http1_only()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            handles: RwLock::new(HashMap::new()),
            global_limit: Arc::new(Semaphore::new(config.max_conns_total)),
            config: config.clone(),
        })
    }

    /// Cached handle for `backend`, built on first use.
    ///
    /// Hits only take the shared lock. A miss re-checks under the exclusive
    /// lock so concurrent misses build exactly one handle. Build failures
    /// are not cached.
    pub fn get(&self, backend: &str) -> Result<Arc<ForwardHandle>, ProxyError> {
        if let Some(handle) = self.handles.read().get(backend) {
            return Ok(handle.clone());
        }

        let mut handles = self.handles.write();
        if let Some(handle) = handles.get(backend) {
            return Ok(handle.clone());
        }

        let handle = Arc::new(ForwardHandle::new(
            backend,
            self.client.clone(),
            Arc::new(Semaphore::new(self.config.max_conns_per_host)),
            self.global_limit.clone(),
            self.config.response_header_timeout(),
        )?);
        handles.insert(backend.to_string(), handle.clone());
        tracing::debug!(backend = %backend, cache_size = handles.len(), "Created forward handle");

        Ok(handle)
    }

    /// Number of cached handles.
    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn transport_config(&self) -> &TransportConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> ProxyPool {
        ProxyPool::new(&TransportConfig::default()).unwrap()
    }

    #[test]
    fn test_hit_returns_same_handle() {
        let pool = pool();
        let first = pool.get("http://a.internal").unwrap();
        let second = pool.get("http://a.internal").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_one_entry_per_backend() {
        let pool = pool();
        assert!(pool.is_empty());
        pool.get("http://a.internal").unwrap();
        pool.get("http://b.internal").unwrap();
        pool.get("http://a.internal").unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_malformed_uri_is_not_cached() {
        let pool = pool();
        assert!(matches!(
            pool.get("::not-a-uri"),
            Err(ProxyError::ProxyInit { .. })
        ));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_concurrent_misses_build_one_handle() {
        let pool = Arc::new(pool());
        let barrier = Arc::new(std::sync::Barrier::new(16));

        let workers: Vec<_> = (0..16)
            .map(|_| {
                let pool = pool.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    pool.get("http://a.internal").unwrap()
                })
            })
            .collect();

        let handles: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        assert_eq!(pool.len(), 1);
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
    }
}
