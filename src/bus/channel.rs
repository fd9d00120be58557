//! In-process message bus over a bounded channel.
//!
//! Outbound messages are queued for the module that consumes the receiver;
//! that module answers by calling [`ChannelBus::deliver`] with a reply whose
//! `parent_id` is the request id.

use futures_util::future::BoxFuture;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};

use crate::bus::correlation::Correlator;
use crate::bus::message::Message;
use crate::bus::{BusError, MessageBus};
use crate::observability::{MetricEvent, MetricsSink};

/// Channel-backed bus endpoint with reply correlation.
#[derive(Clone)]
pub struct ChannelBus {
    module: String,
    outbound: mpsc::Sender<Message>,
    correlator: Correlator,
    metrics: MetricsSink,
}

impl ChannelBus {
    /// Create the bus and the receiver the destination module consumes.
    pub fn new(
        module: impl Into<String>,
        capacity: usize,
        metrics: MetricsSink,
    ) -> (Self, mpsc::Receiver<Message>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let bus = Self {
            module: module.into(),
            outbound,
            correlator: Correlator::new(),
            metrics,
        };
        (bus, rx)
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Hand a reply to the request waiting for it. False if nobody waits.
    pub fn deliver(&self, reply: Message) -> bool {
        self.correlator.complete(reply)
    }

    /// Messages queued but not yet taken by the consumer.
    pub fn channel_len(&self) -> usize {
        self.outbound.max_capacity() - self.outbound.capacity()
    }

    /// Requests waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.correlator.pending_count()
    }

    /// Periodically report the outbound queue depth until shutdown.
    pub async fn run_channel_sampler(self, every: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.metrics.record(MetricEvent::ChannelLength {
                        module: self.module.clone(),
                        length: self.channel_len(),
                    });
                }
                _ = shutdown.recv() => {
                    tracing::debug!(module = %self.module, "Channel sampler stopped");
                    break;
                }
            }
        }
    }
}

impl MessageBus for ChannelBus {
    fn send_sync(&self, message: Message, timeout: Duration) -> BoxFuture<'_, Result<Message, BusError>> {
        Box::pin(async move {
            let started = Instant::now();
            let waiter = self.correlator.register(message.id())?;
            let id = message.id().to_string();
            let route = message.route.clone();

            match tokio::time::timeout(timeout, self.outbound.send(message)).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return Err(BusError::Closed),
                Err(_) => {
                    tracing::warn!(message_id = %id, module = %self.module, "Outbound bus queue full until timeout");
                    return Err(BusError::Timeout { id, after: timeout });
                }
            }

            self.metrics.record(MetricEvent::SendDuration {
                route,
                seconds: started.elapsed().as_secs_f64(),
            });
            tracing::trace!(message_id = %id, module = %self.module, "Message queued");

            let remaining = timeout.saturating_sub(started.elapsed());
            waiter.wait(remaining).await.map_err(|e| match e {
                BusError::Timeout { id, .. } => BusError::Timeout { id, after: timeout },
                other => other,
            })
        })
    }
}
