//! Sync-over-async dispatch of a matched local request.
//!
//! # Responsibilities
//! - Read the request body under the size cap
//! - Give the request a fresh identifier and the configured timeout
//! - Invoke the handler and bound the whole call by a hard deadline
//! - Copy the handler's status, headers and (capped) body to the response
//! - Track per-node in-flight requests
//!
//! # Design Decisions
//! - Oversized or unreadable bodies never reach the handler
//! - The hard deadline is the reply timeout plus a fixed grace period
//! - Timeout is swappable at runtime (config reload) without locking

use arc_swap::ArcSwap;
use axum::body::{Body, Bytes};
use axum::http::{header, Request};
use axum::response::Response;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::bridge::handler::{Handler, HandlerError, HandlerRequest};
use crate::observability::{MetricEvent, MetricsSink};
use crate::resilience::{with_deadline, DeadlineExceeded};

/// Maximum bytes read from a request body or a handler response body (12 MiB).
pub const MAX_MESSAGE_BYTES: usize = 12 * (1 << 20);

/// Extra time a handler gets beyond its reply timeout before it is abandoned.
pub const HANDLER_GRACE: Duration = Duration::from_secs(1);

/// Why a dispatch produced no handler response.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("request body unreadable or larger than 12 MiB: {0}")]
    Body(#[source] axum::Error),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error("handler abandoned: {0}")]
    Abandoned(#[from] DeadlineExceeded),
}

/// Bridges local requests to handlers and waits for their replies.
pub struct SyncBridge {
    timeout: ArcSwap<Duration>,
    inflight: DashMap<String, usize>,
    metrics: MetricsSink,
}

impl SyncBridge {
    pub fn new(timeout: Duration, metrics: MetricsSink) -> Self {
        Self {
            timeout: ArcSwap::from_pointee(timeout),
            inflight: DashMap::new(),
            metrics,
        }
    }

    /// Current reply timeout.
    pub fn timeout(&self) -> Duration {
        **self.timeout.load()
    }

    /// Replace the reply timeout for subsequent requests.
    pub fn set_timeout(&self, timeout: Duration) {
        self.timeout.store(Arc::new(timeout));
    }

    /// In-flight bridged requests for a node.
    pub fn inflight(&self, node_id: &str) -> usize {
        self.inflight.get(node_id).map(|n| *n).unwrap_or(0)
    }

    /// Run `handler` for `request` and build the client response.
    pub async fn dispatch(
        &self,
        handler: Arc<dyn Handler>,
        node_id: &str,
        pattern: &str,
        request: Request<Body>,
    ) -> Result<Response, DispatchError> {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, MAX_MESSAGE_BYTES)
            .await
            .map_err(DispatchError::Body)?;

        let request_id = uuid::Uuid::new_v4().to_string();
        let timeout = self.timeout();
        let started = Instant::now();

        tracing::debug!(
            request_id = %request_id,
            node_id = %node_id,
            pattern = %pattern,
            body_bytes = body.len(),
            "Dispatching to handler"
        );

        let handler_request = HandlerRequest {
            request_id: request_id.clone(),
            node_id: node_id.to_string(),
            pattern: pattern.to_string(),
            parts,
            body,
            timeout,
        };

        let result = {
            let _inflight = self.track(node_id);
            with_deadline(timeout + HANDLER_GRACE, handler.invoke(handler_request)).await
        };

        let handler_response = match result {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                tracing::error!(request_id = %request_id, error = %e, "Handle request error");
                return Err(e.into());
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Handler did not return in time");
                return Err(e.into());
            }
        };

        let mut body = handler_response.body;
        if body.len() > MAX_MESSAGE_BYTES {
            tracing::warn!(
                request_id = %request_id,
                body_bytes = body.len(),
                "Handler response body truncated"
            );
            body = truncate(body);
        }

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = handler_response.status;
        // Framing follows the body actually sent, not the handler's headers.
        for (name, value) in handler_response.headers.iter() {
            if *name == header::CONTENT_LENGTH || *name == header::TRANSFER_ENCODING {
                continue;
            }
            response.headers_mut().append(name, value.clone());
        }

        tracing::info!(
            request_id = %request_id,
            status = handler_response.status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Response to client"
        );
        Ok(response)
    }

    fn track(&self, node_id: &str) -> InflightGuard<'_> {
        let depth = {
            let mut entry = self.inflight.entry(node_id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        self.metrics.record(MetricEvent::NodeQueue {
            node_id: node_id.to_string(),
            depth,
        });
        InflightGuard {
            bridge: self,
            node_id: node_id.to_string(),
        }
    }
}

fn truncate(body: Bytes) -> Bytes {
    body.slice(..MAX_MESSAGE_BYTES)
}

struct InflightGuard<'a> {
    bridge: &'a SyncBridge,
    node_id: String,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        let depth = match self.bridge.inflight.get_mut(&self.node_id) {
            Some(mut entry) => {
                *entry = entry.saturating_sub(1);
                *entry
            }
            None => 0,
        };
        self.bridge.inflight.remove_if(&self.node_id, |_, n| *n == 0);
        self.bridge.metrics.record(MetricEvent::NodeQueue {
            node_id: self.node_id.clone(),
            depth,
        });
    }
}
