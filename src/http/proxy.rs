//! Reverse proxy to the authoritative router of a node.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the target base URL
//! - Carry the original `Host` in `X-Forwarded-Host` and the peer in `X-Forwarded-For`
//! - Forward the body untouched and stream the upstream response back
//! - Map transport failures to 502 and slow upstreams to 504
//!
//! # Design Decisions
//! - No retries: forwarding failures are reported, not repeated
//! - Hop-by-hop headers are stripped in both directions

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Request, Uri};
use axum::response::Response;
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::net::SocketAddr;
use std::time::Duration;

use crate::http::response::RouteError;
use crate::resilience::{with_deadline, DeadlineExceeded};

pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

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

/// Forwards requests to other router instances.
#[derive(Clone)]
pub struct ReverseProxy {
    client: Client<HttpConnector, Body>,
    response_timeout: Duration,
}

impl ReverseProxy {
    pub fn new(connect_timeout: Duration, response_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self {
            client,
            response_timeout,
        }
    }

    /// Forward `request` to `target` and return the upstream response.
    pub async fn forward(
        &self,
        target: &str,
        request: Request<Body>,
        peer: Option<SocketAddr>,
    ) -> Result<Response, RouteError> {
        let (mut parts, body) = request.into_parts();
        let uri = target_uri(target, &parts.uri)?;

        let original_host = parts
            .headers
            .get(header::HOST)
            .cloned()
            .or_else(|| parts.uri.authority().and_then(|a| HeaderValue::from_str(a.as_str()).ok()));

        strip_hop_by_hop(&mut parts.headers);
        if let Some(host) = original_host {
            parts.headers.insert(X_FORWARDED_HOST, host);
        }
        if let Some(peer) = peer {
            append_forwarded_for(&mut parts.headers, peer);
        }
        if let Some(authority) = uri.authority() {
            if let Ok(host) = HeaderValue::from_str(authority.as_str()) {
                parts.headers.insert(header::HOST, host);
            }
        }

        tracing::debug!(upstream = %target, uri = %uri, "Forwarding request");
        parts.uri = uri;

        let upstream = Request::from_parts(parts, body);
        let response = match with_deadline(self.response_timeout, self.client.request(upstream)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(RouteError::Upstream(e.to_string())),
            Err(DeadlineExceeded(after)) => return Err(RouteError::UpstreamTimeout(after)),
        };

        Ok(client_response(response))
    }
}

/// Stream an upstream response back to the client without its hop-by-hop headers.
fn client_response(upstream: hyper::Response<Incoming>) -> Response {
    let (mut parts, body) = upstream.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}

/// Join the request path and query onto the target base URL.
pub fn target_uri(target: &str, original: &Uri) -> Result<Uri, RouteError> {
    let invalid = || RouteError::InvalidTarget(target.to_string());

    let base = url::Url::parse(target).map_err(|_| invalid())?;
    if base.scheme() != "http" {
        return Err(invalid());
    }
    let host = base.host_str().ok_or_else(invalid)?;
    let authority = match base.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let prefix = base.path().trim_end_matches('/');
    let path = original.path();
    let query = original.query().map(|q| format!("?{q}")).unwrap_or_default();

    format!("http://{authority}{prefix}{path}{query}")
        .parse()
        .map_err(|_| invalid())
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in &named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, peer: SocketAddr) {
    let ip = peer.ip().to_string();
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.is_empty() => format!("{existing}, {ip}"),
        _ => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
