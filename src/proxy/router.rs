use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::backend::{BackendRegistry, SwitchController};
use crate::metrics::RequestCounters;
use crate::proxy::control;
use crate::proxy::pool::ProxyPool;

/// Errors are logged at warn once per this many failures.
const ERROR_LOG_INTERVAL: u64 = 1000;

/// Shared handles threaded into every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: BackendRegistry,
    pub pool: Arc<ProxyPool>,
    pub counters: Arc<RequestCounters>,
    pub switch: Arc<SwitchController>,
    pub started_at: Instant,
}

/// Control endpoints plus a catch-all that proxies everything else,
/// including other methods on the control paths.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/switch",
            post(control::switch_handler).fallback(proxy_handler),
        )
        .route(
            "/status",
            get(control::status_handler).fallback(proxy_handler),
        )
        .route(
            "/health-check",
            get(control::health_check_handler).fallback(proxy_handler),
        )
        .route(
            "/metrics",
            get(control::metrics_handler).fallback(proxy_handler),
        )
        .fallback(proxy_handler)
        .with_state(state)
}

/// Forward a request to whichever backend is active when it arrives.
///
/// A switch that lands while this request is in flight does not affect it.
pub async fn proxy_handler(State(state): State<AppState>, req: Request<Body>) -> Response {
    state.counters.record_request();

    let backend = state.registry.active_backend();
    let handle = match state.pool.get(&backend) {
        Ok(handle) => handle,
        Err(err) => {
            state.counters.record_error();
            tracing::error!(backend = %backend, error = %err, "Failed to initialise forward handle");
            return err.into_response();
        }
    };

    let client_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);

    match handle.forward(req, client_addr).await {
        Ok(response) => {
            state.counters.record_success();
            response
        }
        Err(err) => {
            let errors = state.counters.record_error();
            tracing::debug!(
                backend = %backend,
                exception = err.error_type(),
                error = %err,
                "Proxy request failed"
            );
            if errors % ERROR_LOG_INTERVAL == 0 {
                tracing::warn!(
                    exception = err.error_type(),
                    total_errors = errors,
                    "Proxy errors accumulating"
                );
            }
            err.into_response()
        }
    }
}
