//! Cloud-side HTTP ingress for edge nodes.
//!
//! Requests addressed to `/<node>/...` are matched against registered path
//! patterns, then either bridged onto the message bus (this instance is the
//! node's authoritative router) or forwarded to the instance that is.

pub mod authority;
pub mod bridge;
pub mod bus;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod routing;

pub use config::schema::RouterConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
