//! Outbound forwarding bound to one backend.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::{Body, HttpBody};
use axum::http::header::{HeaderName, CONNECTION, HOST};
use axum::http::{HeaderMap, HeaderValue, Request, Response, Uri};
use futures_core::Stream;
use reqwest::{Client, Url};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::proxy::error::ProxyError;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Reusable forwarding handle for one backend URI.
///
/// Immutable once built; all handles share the pool's client and therefore
/// its connection pool.
pub struct ForwardHandle {
    backend: String,
    target: Url,
    client: Client,
    host_limit: Arc<Semaphore>,
    global_limit: Arc<Semaphore>,
    header_timeout: Duration,
}

impl ForwardHandle {
    pub(crate) fn new(
        backend: &str,
        client: Client,
        host_limit: Arc<Semaphore>,
        global_limit: Arc<Semaphore>,
        header_timeout: Duration,
    ) -> Result<Self, ProxyError> {
        let target = Url::parse(backend).map_err(|e| ProxyError::ProxyInit {
            backend: backend.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(target.scheme(), "http" | "https") || target.host_str().is_none() {
            return Err(ProxyError::ProxyInit {
                backend: backend.to_string(),
                reason: "expected an http(s) URL with a host".to_string(),
            });
        }

        Ok(Self {
            backend: backend.to_string(),
            target,
            client,
            host_limit,
            global_limit,
            header_timeout,
        })
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Map an inbound request URI onto the backend.
    ///
    /// Paths are joined with exactly one slash; query strings from the
    /// backend URI and the request are merged.
    pub fn upstream_url(&self, uri: &Uri) -> Url {
        let mut url = self.target.clone();
        url.set_path(&join_paths(self.target.path(), uri.path()));

        let query = match (self.target.query(), uri.query()) {
            (Some(base), Some(extra)) if !base.is_empty() && !extra.is_empty() => {
                Some(format!("{}&{}", base, extra))
            }
            (Some(base), _) if !base.is_empty() => Some(base.to_string()),
            (_, Some(extra)) if !extra.is_empty() => Some(extra.to_string()),
            _ => None,
        };
        url.set_query(query.as_deref());
        url
    }

    /// Forward a request, streaming its body to the backend and the
    /// backend's response back.
    ///
    /// Errors only cover failures before response headers arrive; a backend
    /// that fails mid-body simply truncates the stream.
    pub async fn forward(
        &self,
        req: Request<Body>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<Body>, ProxyError> {
        let (parts, body) = req.into_parts();
        let url = self.upstream_url(&parts.uri);
        let headers = outbound_headers(&parts.headers, client_addr);

        let request = self.client.request(parts.method, url).headers(headers);
        let request = if body.is_end_stream() {
            request
        } else {
            request.body(reqwest::Body::wrap_stream(body.into_data_stream()))
        };

        // Per-backend first: a request queued behind a saturated backend must
        // not hold a global slot while it waits.
        let send = async {
            let host = acquire(&self.host_limit).await?;
            let global = acquire(&self.global_limit).await?;
            let upstream_resp = request.send().await.map_err(|source| ProxyError::Transport {
                backend: self.backend.clone(),
                source: source.without_url(),
            })?;
            Ok::<_, ProxyError>((upstream_resp, [host, global]))
        };

        let (upstream_resp, permits) = match timeout(self.header_timeout, send).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ProxyError::HeaderTimeout {
                    backend: self.backend.clone(),
                    duration: self.header_timeout.as_secs(),
                })
            }
        };

        let mut response_builder = Response::builder().status(upstream_resp.status());
        if let Some(headers) = response_builder.headers_mut() {
            copy_end_to_end(upstream_resp.headers(), headers);
        }

        let stream = PermitStream::new(Box::pin(upstream_resp.bytes_stream()), permits);
        response_builder
            .body(Body::from_stream(stream))
            .map_err(|e| ProxyError::Internal(e.to_string()))
    }
}

async fn acquire(limit: &Arc<Semaphore>) -> Result<OwnedSemaphorePermit, ProxyError> {
    limit
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ProxyError::Internal("connection limiter closed".to_string()))
}

fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

fn is_hop_by_hop(name: &HeaderName, connection_tokens: &[String]) -> bool {
    let name = name.as_str();
    HOP_BY_HOP.contains(&name) || connection_tokens.iter().any(|token| token == name)
}

/// Header names listed in `Connection`, which are hop-by-hop for this hop only.
fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

fn copy_end_to_end(from: &HeaderMap, to: &mut HeaderMap) {
    let tokens = connection_tokens(from);
    for (name, value) in from {
        if !is_hop_by_hop(name, &tokens) {
            to.append(name.clone(), value.clone());
        }
    }
}

fn outbound_headers(incoming: &HeaderMap, client_addr: Option<SocketAddr>) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(incoming.len() + 2);
    let tokens = connection_tokens(incoming);
    for (name, value) in incoming {
        if name != HOST && !is_hop_by_hop(name, &tokens) {
            headers.append(name.clone(), value.clone());
        }
    }

    if let Some(host) = incoming.get(HOST) {
        headers.insert(X_FORWARDED_HOST, host.clone());
    }

    if let Some(addr) = client_addr {
        let client_ip = addr.ip().to_string();
        let prior: Vec<&str> = incoming
            .get_all(X_FORWARDED_FOR)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();
        let forwarded_for = if prior.is_empty() {
            client_ip
        } else {
            format!("{}, {}", prior.join(", "), client_ip)
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    headers
}

/// Response body stream that holds connection-limit permits until the body
/// is fully read or dropped.
struct PermitStream<S> {
    inner: S,
    _permits: [OwnedSemaphorePermit; 2],
}

impl<S> PermitStream<S> {
    fn new(inner: S, permits: [OwnedSemaphorePermit; 2]) -> Self {
        Self {
            inner,
            _permits: permits,
        }
    }
}

impl<S> Stream for PermitStream<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
