//! Error types and response handling for the proxy path.
//!
//! Transport failures are classified into a fixed set of kinds, each with a
//! status code and a pre-built JSON body, so the hot error path never
//! formats strings per request.

use std::error::Error as StdError;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Classified outbound transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConnectionRefused,
    Timeout,
    DnsError,
    ConnectionReset,
    BackendError,
}

const CONNECTION_REFUSED_BODY: &str = r#"{"error":"backend unavailable","exception":"connection_refused","detail":"connection refused"}"#;
const TIMEOUT_BODY: &str =
    r#"{"error":"backend unavailable","exception":"timeout","detail":"request timed out"}"#;
const DNS_ERROR_BODY: &str =
    r#"{"error":"backend unavailable","exception":"dns_error","detail":"dns resolution failed"}"#;
const CONNECTION_RESET_BODY: &str = r#"{"error":"backend unavailable","exception":"connection_reset","detail":"connection reset"}"#;
const BACKEND_ERROR_BODY: &str =
    r#"{"error":"backend unavailable","exception":"backend_error","detail":"backend error"}"#;
const PROXY_INIT_BODY: &str =
    r#"{"error":"proxy initialization failed","exception":"proxy_init_error"}"#;
const INTERNAL_BODY: &str = r#"{"error":"internal proxy error","exception":"internal_error"}"#;

impl ErrorKind {
    /// Classify a transport error message. First match wins, since one
    /// message can contain several indicators.
    pub fn classify(message: &str) -> Self {
        let message = message.to_ascii_lowercase();

        if message.contains("connection refused") {
            ErrorKind::ConnectionRefused
        } else if message.contains("timeout") || message.contains("timed out") {
            ErrorKind::Timeout
        } else if message.contains("dns error")
            || message.contains("no such host")
            || message.contains("failed to lookup address")
            || message.contains("name or service not known")
        {
            ErrorKind::DnsError
        } else if message.contains("connection reset") {
            ErrorKind::ConnectionReset
        } else {
            ErrorKind::BackendError
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionRefused => "connection_refused",
            ErrorKind::Timeout => "timeout",
            ErrorKind::DnsError => "dns_error",
            ErrorKind::ConnectionReset => "connection_reset",
            ErrorKind::BackendError => "backend_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::ConnectionRefused => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::DnsError | ErrorKind::ConnectionReset | ErrorKind::BackendError => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    pub fn body(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionRefused => CONNECTION_REFUSED_BODY,
            ErrorKind::Timeout => TIMEOUT_BODY,
            ErrorKind::DnsError => DNS_ERROR_BODY,
            ErrorKind::ConnectionReset => CONNECTION_RESET_BODY,
            ErrorKind::BackendError => BACKEND_ERROR_BODY,
        }
    }
}

/// Errors that can occur while forwarding a single request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// No forward handle could be built for the backend URI.
    #[error("Failed to build proxy for '{backend}': {reason}")]
    ProxyInit { backend: String, reason: String },

    /// The outbound request failed before a response arrived. `source` is
    /// stored without its URL so classification only sees transport text.
    #[error("Request to '{backend}' failed: {source}")]
    Transport {
        backend: String,
        #[source]
        source: reqwest::Error,
    },

    /// The backend did not send response headers in time.
    #[error("No response headers from '{backend}' within {duration}s: timeout")]
    HeaderTimeout { backend: String, duration: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Classified kind for backend-caused failures, `None` for errors that
    /// are not the backend's fault.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ProxyError::Transport { source, .. } => {
                let mut message = error_chain(source);
                if source.is_timeout() {
                    message.push_str(": timeout");
                }
                Some(ErrorKind::classify(&message))
            }
            ProxyError::HeaderTimeout { .. } => Some(ErrorKind::Timeout),
            ProxyError::ProxyInit { .. } | ProxyError::Internal(_) => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::ProxyInit { .. } | ProxyError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::Transport { .. } | ProxyError::HeaderTimeout { .. } => self
                .kind()
                .map_or(StatusCode::BAD_GATEWAY, |kind| kind.status_code()),
        }
    }

    /// Exception string for JSON responses.
    pub fn error_type(&self) -> &'static str {
        match self {
            ProxyError::ProxyInit { .. } => "proxy_init_error",
            ProxyError::Internal(_) => "internal_error",
            ProxyError::Transport { .. } | ProxyError::HeaderTimeout { .. } => self
                .kind()
                .map_or(ErrorKind::BackendError.as_str(), |kind| kind.as_str()),
        }
    }

    fn body(&self) -> &'static str {
        match self {
            ProxyError::ProxyInit { .. } => PROXY_INIT_BODY,
            ProxyError::Internal(_) => INTERNAL_BODY,
            ProxyError::Transport { .. } | ProxyError::HeaderTimeout { .. } => self
                .kind()
                .map_or(BACKEND_ERROR_BODY, |kind| kind.body()),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            [(CONTENT_TYPE, "application/json")],
            Body::from(self.body()),
        )
            .into_response()
    }
}

/// Display of an error and all its sources, joined with ": ".
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
