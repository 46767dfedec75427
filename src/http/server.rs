//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (request buffering, timeout, tracing, request ID)
//! - Answer the `/up` liveness probe without touching the upstream
//! - Bind server to listener
//! - Pick the active or canary upstream for each request
//! - Forward requests to the upstream, optionally buffering the response
//! - Observability (metrics, correlation IDs)

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{
        header::{HeaderName, HeaderValue},
        uri::{Authority, InvalidUri, PathAndQuery, Scheme},
        HeaderMap, Method, Request, StatusCode, Uri, Version,
    },
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::buffer::BufferLimits;
use crate::config::ProxyConfig;
use crate::http::body::{buffer_body, replay_body, set_buffered_length};
use crate::http::middleware::request_buffer_middleware;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::observability::metrics;
use crate::rollout::{RolloutGroup, RolloutSplitter};

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Errors raised while assembling the server from configuration.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid upstream address '{address}': {source}")]
    InvalidUpstream {
        address: String,
        #[source]
        source: InvalidUri,
    },

    #[error("rollout is enabled but rollout.target is not set")]
    MissingRolloutTarget,
}

/// A backend the proxy forwards to.
#[derive(Debug, Clone)]
pub struct Upstream {
    authority: Authority,
}

impl Upstream {
    pub fn parse(address: &str) -> Result<Self, ServerError> {
        let authority = address.parse().map_err(|source| ServerError::InvalidUpstream {
            address: address.to_string(),
            source,
        })?;
        Ok(Self { authority })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Rewrite `original` to point at this upstream, keeping path and query.
    pub fn uri_for(&self, original: &Uri) -> Result<Uri, axum::http::uri::InvalidUriParts> {
        let mut parts = original.clone().into_parts();
        parts.scheme = Some(Scheme::HTTP);
        parts.authority = Some(self.authority.clone());
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        Uri::from_parts(parts)
    }
}

/// Canary upstream together with the splitter deciding who reaches it.
#[derive(Debug, Clone)]
pub struct Canary {
    pub upstream: Upstream,
    pub splitter: Arc<RolloutSplitter>,
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: Client<HttpConnector, Body>,
    pub active: Upstream,
    pub canary: Option<Canary>,
    /// Present when upstream responses are buffered before replying.
    pub response_limits: Option<Arc<BufferLimits>>,
}

impl AppState {
    /// Pick the upstream for a request carrying `headers`.
    fn select(&self, headers: &HeaderMap) -> (RolloutGroup, &Upstream) {
        match &self.canary {
            Some(canary) => {
                let group = canary.splitter.group_for(headers);
                metrics::record_rollout_decision(group.as_str());
                match group {
                    RolloutGroup::Canary => (group, &canary.upstream),
                    RolloutGroup::Active => (group, &self.active),
                }
            }
            None => (RolloutGroup::Active, &self.active),
        }
    }
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let active = Upstream::parse(&config.target.address)?;

        let canary = if config.rollout.enabled {
            let address = config
                .rollout
                .target
                .as_deref()
                .ok_or(ServerError::MissingRolloutTarget)?;
            let splitter = Arc::new(RolloutSplitter::from_config(&config.rollout));

            tracing::info!(
                canary = %address,
                percentage = splitter.percentage(),
                allowlist_size = splitter.allowlist().len(),
                "Rollout enabled"
            );

            Some(Canary {
                upstream: Upstream::parse(address)?,
                splitter,
            })
        } else {
            None
        };

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let response_limits = config
            .buffering
            .buffer_responses
            .then(|| Arc::new(config.buffering.response_limits()));

        let state = AppState {
            client,
            active,
            canary,
            response_limits,
        };

        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let mut proxy = Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state);

        if config.buffering.buffer_requests {
            let limits = Arc::new(config.buffering.request_limits());
            proxy = proxy.layer(from_fn_with_state(limits, request_buffer_middleware));
        }

        // Answered locally, never buffered or forwarded.
        Router::new()
            .route("/up", get(up_handler))
            .merge(proxy)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.target.address,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// The assembled router, for serving without a listener.
    pub fn into_router(self) -> Router {
        self.router
    }
}

/// Main proxy handler.
/// Chooses the rollout group, forwards the request and relays the response.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request.request_id().to_string();
    let has_response_body = request.method() != Method::HEAD;
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let (group, upstream) = state.select(request.headers());

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        group = group.as_str(),
        upstream = %upstream.authority(),
        "Proxying request"
    );

    let (mut parts, body) = request.into_parts();
    parts.uri = match upstream.uri_for(&parts.uri) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(request_id = %request_id, path = %path, error = %e, "Cannot rewrite request URI");
            metrics::record_request(&method, 400, group.as_str(), start_time);
            return (StatusCode::BAD_REQUEST, "Bad Request").into_response();
        }
    };
    parts.version = Version::HTTP_11;
    if let Some(ip) = client_ip {
        append_forwarded_for(&mut parts.headers, ip);
    }

    let response = match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, upstream = %upstream.authority(), error = %e, "Upstream error");
            metrics::record_request(&method, 502, group.as_str(), start_time);
            return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
        }
    };

    let (mut parts, body) = response.into_parts();
    let mut body = Body::new(body);

    let buffer_limits = state
        .response_limits
        .as_ref()
        .filter(|_| has_response_body && status_allows_body(parts.status));

    if let Some(limits) = buffer_limits {
        match buffer_body(body, (**limits).clone()).await {
            Ok(buffer) => {
                set_buffered_length(&mut parts.headers, buffer.len());
                body = replay_body(buffer);
            }
            Err(e) => {
                if e.is_too_large() {
                    tracing::warn!(request_id = %request_id, upstream = %upstream.authority(), "Upstream response too large");
                    metrics::record_oversized("response");
                } else {
                    tracing::error!(request_id = %request_id, error = %e, "Error buffering response");
                }
                metrics::record_request(&method, 502, group.as_str(), start_time);
                return (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response();
            }
        }
    }

    metrics::record_request(&method, parts.status.as_u16(), group.as_str(), start_time);
    Response::from_parts(parts, body)
}

/// Liveness probe served by the proxy itself.
async fn up_handler() -> &'static str {
    "OK"
}

/// Whether a response with `status` may carry a body and framing headers.
fn status_allows_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: IpAddr) {
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{prior}, {ip}"),
        None => ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_rewrite_keeps_path_and_query() {
        let upstream = Upstream::parse("127.0.0.1:3000").unwrap();
        let uri: Uri = "/api/items?page=2".parse().unwrap();

        let rewritten = upstream.uri_for(&uri).unwrap();
        assert_eq!(rewritten.to_string(), "http://127.0.0.1:3000/api/items?page=2");
    }

    #[test]
    fn test_invalid_upstream() {
        assert!(matches!(
            Upstream::parse("bad host"),
            Err(ServerError::InvalidUpstream { .. })
        ));
    }

    #[test]
    fn test_forwarded_for_appends() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "10.0.0.1".parse().unwrap());
        append_forwarded_for(&mut headers, "10.0.0.2".parse().unwrap());
        assert_eq!(headers.get(&X_FORWARDED_FOR).unwrap(), "10.0.0.1, 10.0.0.2");
    }

    #[test]
    fn test_bodiless_statuses() {
        assert!(status_allows_body(StatusCode::OK));
        assert!(status_allows_body(StatusCode::NOT_FOUND));
        assert!(!status_allows_body(StatusCode::NO_CONTENT));
        assert!(!status_allows_body(StatusCode::NOT_MODIFIED));
        assert!(!status_allows_body(StatusCode::CONTINUE));
    }

    #[tokio::test]
    async fn test_up_is_answered_locally() {
        use tower::ServiceExt;

        let mut config = ProxyConfig::default();
        config.target.address = "127.0.0.1:1".into();
        let router = HttpServer::new(config).unwrap().into_router();

        let request = Request::builder().uri("/up").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_rollout_requires_target() {
        let mut config = ProxyConfig::default();
        config.rollout.enabled = true;
        assert!(matches!(
            HttpServer::new(config),
            Err(ServerError::MissingRolloutTarget)
        ));
    }

    #[tokio::test]
    async fn test_select_routes_allowlisted_to_canary() {
        let mut config = ProxyConfig::default();
        config.rollout.enabled = true;
        config.rollout.target = Some("127.0.0.1:3001".into());
        config.rollout.allowlist = vec!["vip-client".into()];

        let canary = Canary {
            upstream: Upstream::parse("127.0.0.1:3001").unwrap(),
            splitter: Arc::new(RolloutSplitter::from_config(&config.rollout)),
        };
        let state = AppState {
            client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
            active: Upstream::parse("127.0.0.1:3000").unwrap(),
            canary: Some(canary),
            response_limits: None,
        };

        let mut headers = HeaderMap::new();
        let (group, upstream) = state.select(&headers);
        assert_eq!(group, RolloutGroup::Active);
        assert_eq!(upstream.authority().as_str(), "127.0.0.1:3000");

        headers.insert("cookie", HeaderValue::from_static("canary-rollout=vip-client"));
        let (group, upstream) = state.select(&headers);
        assert_eq!(group, RolloutGroup::Canary);
        assert_eq!(upstream.authority().as_str(), "127.0.0.1:3001");
    }
}
