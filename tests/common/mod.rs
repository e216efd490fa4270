//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::Router;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Notify;

use endpoint_router::config::EngineConfig;
use endpoint_router::http::default_handler;
use endpoint_router::{Bind, Endpoint, Node, ReconciliationEngine};

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub fn loopback(port: u16) -> Bind {
    Bind::new("127.0.0.1".parse().unwrap(), port)
}

/// An endpoint with one node per port, named `node-0`, `node-1`, ...
pub fn endpoint(name: &str, ports: &[u16]) -> Endpoint {
    Endpoint::new(
        name,
        ports
            .iter()
            .enumerate()
            .map(|(i, port)| Node::new(format!("node-{i}"), vec![loopback(*port)]))
            .collect(),
    )
}

pub fn engine() -> ReconciliationEngine {
    engine_with(EngineConfig::default())
}

pub fn engine_with(config: EngineConfig) -> ReconciliationEngine {
    ReconciliationEngine::new(config, default_handler())
}

/// A handler that signals `entered` and then holds the request for 30s.
pub fn stalling_handler(entered: Arc<Notify>) -> Router {
    Router::new().fallback(move || {
        let entered = entered.clone();
        async move {
            entered.notify_one();
            tokio::time::sleep(Duration::from_secs(30)).await;
            StatusCode::OK
        }
    })
}

/// Open a connection to `bind` and send one request without waiting for the reply.
pub async fn send_request(bind: Bind) -> TcpStream {
    let mut stream = TcpStream::connect(bind.socket_addr()).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    stream
}

/// True if something accepts TCP connections on `bind`.
pub async fn is_listening(bind: Bind) -> bool {
    let addr: SocketAddr = bind.socket_addr();
    TcpStream::connect(addr).await.is_ok()
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// A fresh directory under the system temp dir.
pub fn scratch_dir(label: &str) -> PathBuf {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let dir = std::env::temp_dir().join(format!(
        "endpoint-router-{label}-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
