//! HTTP front door.
//!
//! # Responsibilities
//! - Create the Axum router with a single catch-all handler
//! - Wire up middleware (tracing, request ID, in-flight limit)
//! - Drive each request through matcher → authority → bridge or proxy
//! - Serve until the shutdown broadcast fires

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::authority::{Authority, AuthorityResolver, NodeRegistry};
use crate::bridge::{Handler, SyncBridge};
use crate::config::RouterConfig;
use crate::http::proxy::ReverseProxy;
use crate::http::response::RouteError;
use crate::net::own_router_url;
use crate::observability::{MetricEvent, MetricsSink};
use crate::routing::matcher::split_path;
use crate::routing::PatternRegistry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub patterns: Arc<PatternRegistry<dyn Handler>>,
    pub resolver: Arc<AuthorityResolver>,
    pub bridge: Arc<SyncBridge>,
    pub proxy: ReverseProxy,
    pub metrics: MetricsSink,
}

impl AppState {
    pub fn new(
        config: &RouterConfig,
        nodes: Arc<dyn NodeRegistry>,
        patterns: Arc<PatternRegistry<dyn Handler>>,
        metrics: MetricsSink,
    ) -> Self {
        let own_url = own_router_url(&config.listener);
        tracing::info!(own_url = %own_url, "Router URL resolved");

        Self {
            patterns,
            resolver: Arc::new(AuthorityResolver::new(
                nodes,
                config.registry.router_url_annotation.clone(),
                own_url,
            )),
            bridge: Arc::new(SyncBridge::new(config.timeouts.request_timeout(), metrics.clone())),
            proxy: ReverseProxy::new(
                config.timeouts.proxy_connect_timeout(),
                config.timeouts.proxy_response_timeout(),
            ),
            metrics,
        }
    }
}

/// HTTP server for the router.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &RouterConfig, state: AppState) -> Self {
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &RouterConfig, state: AppState) -> Router {
        Router::new()
            .route("/", any(front_door))
            .route("/{*path}", any(front_door))
            .with_state(state)
            .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_inflight_requests.max(1)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, for serving or in-process testing.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn front_door(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let (response, outcome) = match route(&state, request).await {
        Ok(routed) => routed,
        Err(err) => {
            match &err {
                RouteError::MalformedPath | RouteError::NoPatternMatch | RouteError::BodyRead(_) => {
                    tracing::warn!(method = %method, path = %path, error = %err, "Request rejected");
                }
                RouteError::UnknownNode(_) => {
                    tracing::info!(method = %method, path = %path, error = %err, "Request rejected");
                }
                // Already logged by the bridge with its request id.
                RouteError::HandlerTimeout(_) | RouteError::HandlerFailed(_) => {}
                RouteError::InvalidTarget(_) | RouteError::Upstream(_) | RouteError::UpstreamTimeout(_) => {
                    tracing::error!(method = %method, path = %path, error = %err, "Forwarding failed");
                }
            }
            let outcome = err.outcome();
            (err.into_response(), outcome)
        }
    };

    state.metrics.record(MetricEvent::HttpRequest {
        outcome,
        status: response.status().as_u16(),
    });
    tracing::debug!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        outcome,
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "Request completed"
    );
    response
}

async fn route(state: &AppState, request: Request<Body>) -> Result<(Response, &'static str), RouteError> {
    let path = request.uri().path().to_string();

    let mut segments = split_path(&path);
    let node_id = match (segments.next(), segments.next()) {
        (Some(node_id), Some(_)) => node_id.to_string(),
        _ => return Err(RouteError::MalformedPath),
    };

    let matched = state.patterns.best_match(&path).ok_or(RouteError::NoPatternMatch)?;

    match state.resolver.resolve(&node_id) {
        Authority::Unknown => Err(RouteError::UnknownNode(node_id)),
        Authority::Remote(target) => {
            tracing::info!(node_id = %node_id, upstream = %target, "Not authoritative, forwarding");
            let peer = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr);
            let response = state.proxy.forward(&target, request, peer).await?;
            Ok((response, "forwarded"))
        }
        Authority::Local => {
            let response = state
                .bridge
                .dispatch(matched.handler, &node_id, &matched.pattern, request)
                .await?;
            Ok((response, "local"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{InMemoryNodeRegistry, Node};
    use crate::bridge::{HandlerError, HandlerRequest, HandlerResponse};
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    const ANNOTATION: &str = "edge.router/authoritative-url";
    const OWN_URL: &str = "http://10.0.0.5:9443";

    fn app(calls: Arc<AtomicUsize>) -> Router {
        let mut config = RouterConfig::default();
        config.listener.advertise_url = Some(OWN_URL.to_string());

        let nodes = InMemoryNodeRegistry::new();
        nodes.upsert(Node::new("node1").with_annotation(ANNOTATION, OWN_URL));
        nodes.upsert(Node::new("bare"));

        let patterns: Arc<PatternRegistry<dyn Handler>> = Arc::new(PatternRegistry::new());
        let handler: Arc<dyn Handler> = Arc::new(move |req: HandlerRequest| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok::<_, HandlerError>(HandlerResponse::ok(format!("{}:{}", req.node_id, req.pattern)))
            }
        });
        patterns.register("/{node}/twin/update", handler).unwrap();

        let state = AppState::new(&config, Arc::new(nodes), patterns, MetricsSink::disabled());
        HttpServer::new(&config, state).into_router()
    }

    async fn send(app: Router, path: &str) -> (StatusCode, String, Option<String>) {
        let resp = app
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let request_id = resp
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap(), request_id)
    }

    #[tokio::test]
    async fn test_local_request_reaches_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (status, body, request_id) = send(app(calls.clone()), "/node1/twin/update").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "node1:/{node}/twin/update");
        assert!(request_id.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_short_path_is_not_found() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (status, body, _) = send(app(calls.clone()), "/node1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Request error");

        let (status, _, _) = send(app(calls.clone()), "/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unmatched_path_is_not_found() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (status, body, _) = send(app(calls.clone()), "/node1/device/list").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Request error");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_or_unadvertised_node_is_not_found() {
        let calls = Arc::new(AtomicUsize::new(0));
        for path in ["/ghost/twin/update", "/bare/twin/update"] {
            let (status, body, _) = send(app(calls.clone()), path).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body, "No rule match");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
