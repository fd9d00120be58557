//! Per-request failures and their HTTP responses.
//!
//! # Responsibilities
//! - Name every way a single request can fail
//! - Map each failure to a status code and a plain-text body
//! - Label the failure for the request outcome metric
//!
//! # Design Decisions
//! - Failures never escape the request that caused them
//! - Handler timeouts and upstream timeouts are both 504; other handler or
//!   upstream failures are 502

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use thiserror::Error;

use crate::bridge::{DispatchError, HandlerError};

/// Why a request got no normal response.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("path has fewer than two segments")]
    MalformedPath,

    #[error("no pattern matches the path")]
    NoPatternMatch,

    #[error("node {0} is unknown or has no authoritative router")]
    UnknownNode(String),

    #[error("request body unreadable: {0}")]
    BodyRead(String),

    #[error("handler gave no reply within {0:?}")]
    HandlerTimeout(Duration),

    #[error("handler failed: {0}")]
    HandlerFailed(String),

    #[error("target {0} is not a usable http URL")]
    InvalidTarget(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("upstream did not respond within {0:?}")]
    UpstreamTimeout(Duration),
}

impl RouteError {
    pub fn status(&self) -> StatusCode {
        match self {
            RouteError::MalformedPath | RouteError::NoPatternMatch | RouteError::UnknownNode(_) => {
                StatusCode::NOT_FOUND
            }
            RouteError::BodyRead(_) => StatusCode::BAD_REQUEST,
            RouteError::HandlerTimeout(_) | RouteError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RouteError::HandlerFailed(_) | RouteError::InvalidTarget(_) | RouteError::Upstream(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Outcome label for the request counter.
    pub fn outcome(&self) -> &'static str {
        match self {
            RouteError::MalformedPath | RouteError::BodyRead(_) => "malformed",
            RouteError::NoPatternMatch | RouteError::UnknownNode(_) => "no_route",
            RouteError::HandlerTimeout(_) | RouteError::HandlerFailed(_) => "handler_error",
            RouteError::InvalidTarget(_) | RouteError::Upstream(_) | RouteError::UpstreamTimeout(_) => {
                "forward_error"
            }
        }
    }

    fn body(&self) -> String {
        match self {
            RouteError::MalformedPath | RouteError::NoPatternMatch => "Request error".to_string(),
            RouteError::UnknownNode(_) => "No rule match".to_string(),
            RouteError::BodyRead(reason) => format!("Request error, body is invalid: {reason}"),
            RouteError::HandlerTimeout(_) => "Timed out waiting for reply".to_string(),
            RouteError::HandlerFailed(_) => "Handler failed".to_string(),
            RouteError::InvalidTarget(_) | RouteError::Upstream(_) => "Upstream request failed".to_string(),
            RouteError::UpstreamTimeout(_) => "Upstream timed out".to_string(),
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        (self.status(), self.body()).into_response()
    }
}

impl From<DispatchError> for RouteError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Body(e) => RouteError::BodyRead(e.to_string()),
            DispatchError::Handler(HandlerError::Timeout(after)) => RouteError::HandlerTimeout(after),
            DispatchError::Handler(e) => RouteError::HandlerFailed(e.to_string()),
            DispatchError::Abandoned(e) => RouteError::HandlerTimeout(e.0),
        }
    }
}
