//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::DefaultBodyLimit,
    http::{header, HeaderMap, StatusCode},
    routing::{any, get},
    Router,
};
use canary_proxy::{HttpServer, ProxyConfig, Shutdown};
use tokio::net::TcpListener;

/// A running backend that echoes request bodies.
pub struct EchoBackend {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl EchoBackend {
    /// Requests served so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Start a backend that echoes the request body and names itself in `x-backend`.
pub async fn start_echo_backend(name: &'static str) -> EchoBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = hits.clone();
    let app = Router::new()
        .fallback(move |body: Bytes| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                ([("x-backend", name)], body)
            }
        })
        .layer(DefaultBodyLimit::disable());

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    EchoBackend { addr, hits }
}

/// Start a backend with fixed answers:
/// - `GET /`: "hello world"
/// - `/nc`: 204
/// - `/framing`: the request's `content-length|transfer-encoding`, "none" when absent
pub async fn start_fixed_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new()
        .route("/", get(|| async { "hello world" }))
        .route("/nc", any(|| async { StatusCode::NO_CONTENT }))
        .route(
            "/framing",
            any(|headers: HeaderMap| async move {
                let value = |name| {
                    headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("none")
                        .to_string()
                };
                format!("{}|{}", value(header::CONTENT_LENGTH), value(header::TRANSFER_ENCODING))
            }),
        );

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    addr
}

/// Default config forwarding to `target`.
pub fn proxy_config(target: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.target.address = target.to_string();
    config
}

/// Start the proxy on an ephemeral port.
///
/// The listener is bound before returning, so requests can be sent immediately.
pub async fn start_proxy(config: ProxyConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Deterministic, non-repeating-looking test payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 253) as u8).collect()
}

/// Wait up to two seconds for `dir` to hold no files.
pub async fn wait_until_empty(dir: &Path) -> bool {
    for _ in 0..40 {
        if std::fs::read_dir(dir).unwrap().next().is_none() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
