//! Handler capability and its request/response types.

use axum::body::Bytes;
use axum::http::{request, HeaderMap, HeaderValue, StatusCode};
use axum::http::header::IntoHeaderName;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::bus::BusError;

/// Everything a handler gets for one bridged request.
#[derive(Debug)]
pub struct HandlerRequest {
    /// Fresh identifier, also used as the bus message id.
    pub request_id: String,
    /// Node the request is addressed to (first path segment).
    pub node_id: String,
    /// Pattern that selected this handler.
    pub pattern: String,
    /// Original request line and headers.
    pub parts: request::Parts,
    /// Request body, already bounded by the size cap.
    pub body: Bytes,
    /// How long the handler may wait for a reply.
    pub timeout: Duration,
}

/// Structured response returned by a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HandlerResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    /// Builder-style header append.
    pub fn with_header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }
}

/// Why a handler produced no response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("bus error: {0}")]
    Bus(BusError),

    #[error("invalid reply: {0}")]
    InvalidReply(String),

    #[error("handler failed: {0}")]
    Failed(String),
}

impl From<BusError> for HandlerError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Timeout { after, .. } => HandlerError::Timeout(after),
            other => HandlerError::Bus(other),
        }
    }
}

/// A capability that turns a bridged request into a response.
pub trait Handler: Send + Sync {
    fn invoke(&self, request: HandlerRequest) -> BoxFuture<'static, Result<HandlerResponse, HandlerError>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(HandlerRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HandlerResponse, HandlerError>> + Send + 'static,
{
    fn invoke(&self, request: HandlerRequest) -> BoxFuture<'static, Result<HandlerResponse, HandlerError>> {
        Box::pin(self(request))
    }
}
