//! Backends for exercising the switch: a scripted HTTP origin and raw TCP
//! peers that misbehave at the transport level.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// What the origin saw for one request, including health probes.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl SeenRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Scripted answer for the next request. Unscripted requests get
/// `200 {"ok":true}`.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn json(body: &str) -> Self {
        Self {
            status: StatusCode::OK,
            headers: vec![("content-type", "application/json".to_string())],
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    /// Non-200 answer, which also fails a health probe.
    pub fn status(code: u16) -> Self {
        Self {
            status: StatusCode::from_u16(code).unwrap(),
            ..Self::json(&format!(r#"{{"status":{code}}}"#))
        }
    }

    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct Script {
    seen: Mutex<Vec<SeenRequest>>,
    replies: Mutex<VecDeque<Reply>>,
}

/// HTTP origin serving every path, `/` included so probes land.
pub struct MockBackend {
    pub addr: SocketAddr,
    script: Arc<Script>,
    stop: watch::Sender<bool>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let script = Arc::new(Script::default());
        let app = Router::new()
            .route("/", any(answer))
            .route("/{*path}", any(answer))
            .with_state(script.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, mut stopped) = watch::channel(false);

        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stopped.wait_for(|stop| *stop).await;
                })
                .await;
        });

        Self { addr, script, stop }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue the answer for the next request, probe or proxied.
    pub fn reply_next(&self, reply: Reply) {
        self.script.replies.lock().push_back(reply);
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.script.seen.lock().clone()
    }

    /// Requests that reached `path`, ignoring probes and other paths.
    pub fn requests_to(&self, path: &str) -> Vec<SeenRequest> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
    }
}

async fn answer(
    State(script): State<Arc<Script>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    script.seen.lock().push(SeenRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    });

    let reply = script
        .replies
        .lock()
        .pop_front()
        .unwrap_or_else(|| Reply::json(r#"{"ok":true}"#));
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }

    let mut response = (reply.status, reply.body).into_response();
    for (name, value) in reply.headers {
        response
            .headers_mut()
            .insert(name, value.parse().unwrap());
    }
    response
}

#[derive(Debug, Clone, Copy)]
enum Misbehaviour {
    /// Read the request, then never answer.
    Stall,
    /// Read the request, then close the connection without answering.
    HangUp,
}

/// Raw TCP peer that accepts connections but never speaks HTTP back.
pub struct RawBackend {
    pub addr: SocketAddr,
    accept_loop: JoinHandle<()>,
}

impl RawBackend {
    pub async fn stalled() -> Self {
        Self::start(Misbehaviour::Stall).await
    }

    pub async fn hanging_up() -> Self {
        Self::start(Misbehaviour::HangUp).await
    }

    async fn start(mode: Misbehaviour) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept_loop = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(misbehave(stream, mode));
            }
        });

        Self { addr, accept_loop }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for RawBackend {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

async fn misbehave(mut stream: TcpStream, mode: Misbehaviour) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }

    match mode {
        // Dropping the stream closes it cleanly: nothing is left unread.
        Misbehaviour::HangUp => {}
        // Hold the socket until the proxy gives up on it.
        Misbehaviour::Stall => {
            while let Ok(n) = stream.read(&mut buf).await {
                if n == 0 {
                    return;
                }
            }
        }
    }
}
