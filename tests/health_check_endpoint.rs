//! On-demand backend probes via `/health-check`.

mod common;

use common::mock_backend::{MockBackend, Reply};
use common::{refused_backend, test_config, TestProxy};
use serde_json::Value;
use tempfile::TempDir;
use traffic_switch::backend::Version;

#[tokio::test]
async fn test_healthy_backend() {
    let a = MockBackend::start().await;
    let b = MockBackend::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&a.url(), &b.url(), &dir);
    let proxy = TestProxy::start(&config).await;

    let resp = reqwest::Client::new()
        .get(proxy.url("/health-check?version=v2"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["version"], "v2");
    assert_eq!(body["backend"], b.url());
    assert_eq!(body["healthy"], true);
    assert!(body["check_duration_ms"].is_u64());
    assert!(body["timestamp"].as_u64().unwrap() > 0);

    let probes = b.requests();
    assert_eq!(probes.len(), 1);
    assert_eq!(probes[0].method, "GET");
    assert_eq!(probes[0].path, "/");

    // Probing never switches.
    assert_eq!(proxy.registry.current_version(), Version::V1);
}

#[tokio::test]
async fn test_non_200_is_unhealthy() {
    let a = MockBackend::start().await;
    let b = MockBackend::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&a.url(), &b.url(), &dir);
    let proxy = TestProxy::start(&config).await;

    b.reply_next(Reply::status(302).header("location", "/elsewhere"));
    b.reply_next(Reply::status(503));

    let client = reqwest::Client::new();
    for _ in 0..2 {
        let body: Value = client
            .get(proxy.url("/health-check?version=v2"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["healthy"], false);
    }
    // The redirect was not followed.
    assert_eq!(b.requests().len(), 2);
}

#[tokio::test]
async fn test_unreachable_backend_is_unhealthy() {
    let a = MockBackend::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&a.url(), &refused_backend(), &dir);
    let proxy = TestProxy::start(&config).await;

    let resp = reqwest::Client::new()
        .get(proxy.url("/health-check?version=v2"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["healthy"], false);
}

#[tokio::test]
async fn test_missing_or_invalid_version() {
    let a = MockBackend::start().await;
    let b = MockBackend::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&a.url(), &b.url(), &dir);
    let proxy = TestProxy::start(&config).await;
    let client = reqwest::Client::new();

    for path in ["/health-check", "/health-check?version=", "/health-check?version=v3"] {
        let resp = client.get(proxy.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), 400, "path {path}");
    }
    assert!(a.requests().is_empty());
    assert!(b.requests().is_empty());
}
