//! Operator endpoints: switch, status, on-demand health check, metrics.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::backend::{SwitchError, Version, VersionError};
use crate::metrics::CounterSnapshot;
use crate::proxy::router::AppState;

/// Errors returned by the control endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request body: {0}")]
    BadRequestBody(String),

    #[error("missing version parameter, e.g. ?version=v1")]
    MissingVersion,

    #[error(transparent)]
    InvalidVersion(#[from] VersionError),

    #[error(transparent)]
    Switch(#[from] SwitchError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequestBody(_)
            | ApiError::MissingVersion
            | ApiError::InvalidVersion(_)
            | ApiError::Switch(SwitchError::InvalidVersion(_)) => StatusCode::BAD_REQUEST,
            ApiError::Switch(SwitchError::UnhealthyTarget { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Switch(SwitchError::Persistence { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Exception string for JSON responses.
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::BadRequestBody(_) => "bad_request_body",
            ApiError::MissingVersion
            | ApiError::InvalidVersion(_)
            | ApiError::Switch(SwitchError::InvalidVersion(_)) => "invalid_version",
            ApiError::Switch(SwitchError::UnhealthyTarget { .. }) => "unhealthy_target",
            ApiError::Switch(SwitchError::Persistence { .. }) => "persistence_failure",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self {
            ApiError::Switch(SwitchError::UnhealthyTarget {
                version,
                backend,
                current,
            }) => json!({
                "error": "switch failed: target backend unavailable",
                "exception": self.error_type(),
                "version": version,
                "backend": backend,
                "current_version": current.version,
                "current_backend": current.backend,
            }),
            ApiError::Switch(SwitchError::Persistence { version, .. }) => json!({
                "error": "switch failed: could not persist version",
                "exception": self.error_type(),
                "version": version,
            }),
            _ => json!({
                "error": self.to_string(),
                "exception": self.error_type(),
            }),
        };

        (self.status_code(), Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SwitchRequest {
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct SwitchResponse {
    pub success: bool,
    pub message: String,
    pub version: Version,
    pub backend: String,
    pub health_check: &'static str,
}

pub async fn switch_handler(
    State(state): State<AppState>,
    payload: Result<Json<SwitchRequest>, JsonRejection>,
) -> Result<Json<SwitchResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequestBody(e.body_text()))?;
    if request.version.is_empty() {
        return Err(ApiError::BadRequestBody("version is required".to_string()));
    }

    let outcome = state.switch.switch(&request.version).await?;

    Ok(Json(SwitchResponse {
        success: true,
        message: format!("switched to version {}", outcome.version),
        version: outcome.version,
        backend: outcome.backend,
        health_check: "passed",
    }))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub current_version: Version,
    pub current_backend: String,
    pub backends: BackendsView,
}

#[derive(Debug, Serialize)]
pub struct BackendsView {
    pub v1: String,
    pub v2: String,
}

pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let current = state.registry.snapshot();
    let backends = state.registry.backends();

    Json(StatusResponse {
        current_version: current.version,
        current_backend: current.backend,
        backends: BackendsView {
            v1: backends.v1,
            v2: backends.v2,
        },
    })
}

#[derive(Debug, Deserialize)]
pub struct HealthCheckQuery {
    pub version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub version: Version,
    pub backend: String,
    pub healthy: bool,
    pub check_duration_ms: u64,
    pub timestamp: u64,
}

/// Probe a backend on demand without switching to it.
pub async fn health_check_handler(
    State(state): State<AppState>,
    Query(query): Query<HealthCheckQuery>,
) -> Result<Json<HealthCheckResponse>, ApiError> {
    let label = query
        .version
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::MissingVersion)?;
    let version: Version = label.parse()?;
    let backend = state.registry.backends().uri_for(version).to_string();

    let started = Instant::now();
    let healthy = state.switch.gate().probe(&backend).await;
    let check_duration_ms = started.elapsed().as_millis() as u64;

    Ok(Json(HealthCheckResponse {
        version,
        backend,
        healthy,
        check_duration_ms,
        timestamp: unix_timestamp(),
    }))
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub timestamp: u64,
    pub requests: RequestsView,
    pub proxy: ProxyView,
    pub runtime: RuntimeView,
}

#[derive(Debug, Serialize)]
pub struct RequestsView {
    #[serde(flatten)]
    pub counters: CounterSnapshot,
    pub success_rate: String,
}

#[derive(Debug, Serialize)]
pub struct ProxyView {
    pub cache_size: usize,
    pub transport: TransportView,
}

#[derive(Debug, Serialize)]
pub struct TransportView {
    pub max_idle_per_host: usize,
    pub max_conns_per_host: usize,
    pub max_conns_total: usize,
    pub connect_timeout_ms: u64,
    pub response_header_timeout_seconds: u32,
    pub idle_timeout_seconds: u32,
}

/// Informational only; fields may change.
#[derive(Debug, Serialize)]
pub struct RuntimeView {
    pub workers: usize,
    pub alive_tasks: usize,
    pub cpu_cores: usize,
    pub uptime_seconds: u64,
}

pub async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsResponse> {
    let counters = state.counters.snapshot();
    let transport = state.pool.transport_config();
    let runtime = tokio::runtime::Handle::current().metrics();

    Json(MetricsResponse {
        timestamp: unix_timestamp(),
        requests: RequestsView {
            counters,
            success_rate: format!("{:.2}%", counters.success_rate()),
        },
        proxy: ProxyView {
            cache_size: state.pool.len(),
            transport: TransportView {
                max_idle_per_host: transport.max_idle_per_host,
                max_conns_per_host: transport.max_conns_per_host,
                max_conns_total: transport.max_conns_total,
                connect_timeout_ms: transport.connect_timeout_ms,
                response_header_timeout_seconds: transport.response_header_timeout_seconds,
                idle_timeout_seconds: transport.idle_timeout_seconds,
            },
        },
        runtime: RuntimeView {
            workers: runtime.num_workers(),
            alive_tasks: runtime.num_alive_tasks(),
            cpu_cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            uptime_seconds: state.started_at.elapsed().as_secs(),
        },
    })
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
