//! Shared utilities for integration testing.

use axum::{body::Body, http::Request, routing::any, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use cloud_router::config::RouterConfig;
use cloud_router::http::{AppState, HttpServer};
use cloud_router::lifecycle::Shutdown;

pub const ANNOTATION: &str = "edge.router/authoritative-url";

/// Config for a router on `127.0.0.1:port` that advertises itself at that address.
pub fn router_config(port: u16) -> RouterConfig {
    let mut config = RouterConfig::default();
    config.listener.address = "127.0.0.1".to_string();
    config.listener.port = port as i64;
    config.listener.advertise_url = Some(format!("http://127.0.0.1:{port}"));
    config.observability.metrics_enabled = false;
    config
}

/// Bind and serve the router in the background. Traffic is accepted on return.
pub async fn start_router(config: &RouterConfig, state: AppState) -> Shutdown {
    let shutdown = Shutdown::new();
    let listener = TcpListener::bind(config.listener.bind_address()).await.unwrap();
    let server = HttpServer::new(config, state);
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });
    shutdown
}

/// Start a peer that answers `<x-forwarded-host>|<path>|<body>`.
pub async fn start_echo_peer(addr: SocketAddr) {
    let app = Router::new().route(
        "/{*path}",
        any(|req: Request<Body>| async move {
            let forwarded = req
                .headers()
                .get("x-forwarded-host")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            let path = req.uri().path().to_string();
            let body = axum::body::to_bytes(req.into_body(), usize::MAX).await.unwrap();
            (
                [("x-peer", "1")],
                format!("{forwarded}|{path}|{}", String::from_utf8_lossy(&body)),
            )
        }),
    );

    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
}

/// A client without connection pooling or system proxies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
