//! Sync bridge subsystem.
//!
//! # Data Flow
//! ```text
//! Matched local request
//!     → dispatch.rs (bounded body read, fresh request id, timeout)
//!     → handler.rs (Handler::invoke capability)
//!         → bus_handler.rs (HTTP → bus message → send_sync → reply → HTTP)
//!     → dispatch.rs (copy status/headers/capped body to the client)
//! ```
//!
//! # Design Decisions
//! - Handlers are typed trait objects; the registry cannot hold anything else
//! - Handler timeouts and failures become explicit 504/502 responses upstream
//! - A handler can never hold a request past its timeout plus a fixed grace

pub mod bus_handler;
pub mod dispatch;
pub mod handler;

pub use bus_handler::BusHandler;
pub use dispatch::{DispatchError, SyncBridge, MAX_MESSAGE_BYTES};
pub use handler::{Handler, HandlerError, HandlerRequest, HandlerResponse};
