//! Connection accounting for graceful shutdown.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;

use crate::proxy::shutdown::ShutdownManager;

/// Make-service wrapper that counts accepted connections.
pub struct ConnectionCounter<M> {
    inner: M,
    shutdown: Arc<ShutdownManager>,
}

impl<M> ConnectionCounter<M> {
    pub fn new(inner: M, shutdown: Arc<ShutdownManager>) -> Self {
        Self { inner, shutdown }
    }
}

impl<M: Clone> Clone for ConnectionCounter<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<M, T> Service<T> for ConnectionCounter<M>
where
    M: Service<T> + Send,
    M::Future: Send + 'static,
    M::Response: Send + 'static,
{
    type Response = ConnectionGuard<M::Response>;
    type Error = M::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, target: T) -> Self::Future {
        let token = Arc::new(ConnectionToken::open(self.shutdown.clone()));
        let fut = self.inner.call(target);

        Box::pin(async move {
            let service = fut.await?;
            Ok(ConnectionGuard {
                inner: service,
                _token: token,
            })
        })
    }
}

/// Decrements the connection count once the last clone is dropped.
struct ConnectionToken {
    shutdown: Arc<ShutdownManager>,
}

impl ConnectionToken {
    fn open(shutdown: Arc<ShutdownManager>) -> Self {
        shutdown.increment_connections();
        Self { shutdown }
    }
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        self.shutdown.decrement_connections();
    }
}

/// Per-connection service. The server clones it for every request, so the
/// token is shared rather than owned.
pub struct ConnectionGuard<S> {
    inner: S,
    _token: Arc<ConnectionToken>,
}

impl<S: Clone> Clone for ConnectionGuard<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _token: self._token.clone(),
        }
    }
}

impl<S, Req> Service<Req> for ConnectionGuard<S>
where
    S: Service<Req>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        self.inner.call(req)
    }
}
