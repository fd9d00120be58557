//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, in-flight limit)
//!     → routing (best pattern for the path, or 404)
//!     → authority (local, remote, or 404)
//!     → bridge (local) | proxy.rs (remote)
//!     → response.rs (failures → 4xx/5xx with a plain-text body)
//!     → Send to client
//! ```

pub mod proxy;
pub mod response;
pub mod server;

pub use proxy::ReverseProxy;
pub use response::RouteError;
pub use server::{AppState, HttpServer};
