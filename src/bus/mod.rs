//! Message bus boundary.
//!
//! # Data Flow
//! ```text
//! Bridged request
//!     → MessageBus::send_sync(message, timeout)
//!     → correlation.rs registers the message id
//!     → channel.rs queues the message for the destination module
//!     ...
//! Reply from a module
//!     → channel.rs deliver(reply)
//!     → correlation.rs hands it to the waiter matching parent_id (or drops it)
//! ```
//!
//! # Design Decisions
//! - The bus itself is external; `MessageBus` is the only seam the router needs
//! - Correlation is identifier-scoped and single-consumer
//! - Timeouts are owned by the caller of `send_sync`

pub mod channel;
pub mod correlation;
pub mod message;

use futures_util::future::BoxFuture;
use std::time::Duration;
use thiserror::Error;

pub use channel::ChannelBus;
pub use correlation::{Correlator, PendingReply};
pub use message::{HttpReply, Message, MessageHeader, MessageRoute};

/// Errors surfaced by bus operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("no reply to message {id} within {after:?}")]
    Timeout { id: String, after: Duration },

    #[error("message id {0} is already waiting for a reply")]
    DuplicateId(String),

    #[error("bus channel closed")]
    Closed,
}

/// Synchronous request/reply over the asynchronous bus.
pub trait MessageBus: Send + Sync {
    /// Send `message` and wait for the reply correlated to its id.
    fn send_sync(&self, message: Message, timeout: Duration) -> BoxFuture<'_, Result<Message, BusError>>;
}
