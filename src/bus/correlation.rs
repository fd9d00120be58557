//! Request/reply correlation.
//!
//! # Responsibilities
//! - Track which message ids are waiting for a reply
//! - Hand each reply to exactly the waiter whose id it answers
//! - Discard replies nobody waits for (late, unknown, duplicate)
//!
//! # Design Decisions
//! - One entry per in-flight id; a second registration of a live id is rejected
//! - The waiter owns a guard; dropping it (timeout, cancellation) removes the entry
//! - Delivery removes the entry first, so a reply is consumed at most once

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use crate::bus::message::Message;
use crate::bus::BusError;

/// A request waiting for its reply.
#[derive(Debug)]
struct PendingCorrelation {
    created_at: Instant,
    reply_tx: oneshot::Sender<Message>,
}

/// Concurrency-safe table of in-flight requests.
#[derive(Debug, Clone, Default)]
pub struct Correlator {
    pending: Arc<DashMap<String, PendingCorrelation>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting for a reply to `id`.
    pub fn register(&self, id: &str) -> Result<PendingReply, BusError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let created_at = Instant::now();

        match self.pending.entry(id.to_string()) {
            Entry::Occupied(_) => return Err(BusError::DuplicateId(id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(PendingCorrelation {
                    created_at,
                    reply_tx,
                });
            }
        }

        Ok(PendingReply {
            id: id.to_string(),
            created_at,
            reply_rx,
            pending: Arc::clone(&self.pending),
        })
    }

    /// Route a reply to its waiter.
    ///
    /// Returns false when no request is waiting for it; the reply is dropped.
    pub fn complete(&self, reply: Message) -> bool {
        let Some(parent) = reply.parent_id().map(str::to_string) else {
            tracing::warn!(message_id = %reply.id(), "Reply without parent id discarded");
            return false;
        };

        match self.pending.remove(&parent) {
            Some((_, waiter)) => {
                tracing::trace!(
                    message_id = %parent,
                    elapsed_ms = waiter.created_at.elapsed().as_millis() as u64,
                    "Reply correlated"
                );
                // The waiter may have timed out between removal and send.
                waiter.reply_tx.send(reply).is_ok()
            }
            None => {
                tracing::warn!(message_id = %parent, "No pending request for reply, discarded");
                false
            }
        }
    }

    /// Number of requests currently waiting.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }
}

/// Waiter side of a registration. Dropping it abandons the wait.
#[derive(Debug)]
pub struct PendingReply {
    id: String,
    created_at: Instant,
    reply_rx: oneshot::Receiver<Message>,
    pending: Arc<DashMap<String, PendingCorrelation>>,
}

impl PendingReply {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Time since registration.
    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Wait for the reply for at most `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> Result<Message, BusError> {
        match tokio::time::timeout(timeout, &mut self.reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(BusError::Closed),
            Err(_) => Err(BusError::Timeout {
                id: self.id.clone(),
                after: timeout,
            }),
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        let created_at = self.created_at;
        self.pending
            .remove_if(&self.id, |_, entry| entry.created_at == created_at);
    }
}
