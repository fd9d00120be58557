//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define router metrics (bus traffic, round-trip latency, queue depth)
//! - Expose Prometheus-compatible metrics endpoint
//! - Keep recording off the request path
//!
//! # Metrics
//! - `router_receive_message_count` (counter): replies received, by node/source/group/operation/resource
//! - `router_transmit_message_count` (counter): messages sent, same labels
//! - `router_message_handle_duration_seconds` (histogram): dispatch → reply
//! - `router_message_send_duration_seconds` (histogram): dispatch → accepted by the bus
//! - `router_node_queue_length` (gauge): in-flight bridged requests per node
//! - `router_bus_channel_length` (gauge): outbound bus queue depth per module
//! - `router_http_requests_total` (counter): front door outcomes by status
//!
//! # Design Decisions
//! - Producers `try_send` into a bounded queue; a full queue drops the event
//! - A single consumer task applies events to the `metrics` recorder
//! - Duration histograms share one fixed bucket layout

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use tokio::sync::{broadcast, mpsc};
use tokio::sync::mpsc::error::TrySendError;

use crate::bus::MessageRoute;

/// Bucket boundaries (seconds) for every duration histogram.
pub const DURATION_BUCKETS: [f64; 10] = [0.1, 0.2, 0.4, 0.8, 1.6, 3.0, 5.0, 10.0, 30.0, 60.0];

/// A single observation headed for the recorder.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricEvent {
    MessageTransmitted { node_id: String, route: MessageRoute },
    MessageReceived { node_id: String, route: MessageRoute },
    HandleDuration { route: MessageRoute, seconds: f64 },
    SendDuration { route: MessageRoute, seconds: f64 },
    NodeQueue { node_id: String, depth: usize },
    ChannelLength { module: String, length: usize },
    HttpRequest { outcome: &'static str, status: u16 },
}

/// Cheap, cloneable handle for recording metrics without blocking.
#[derive(Clone, Debug, Default)]
pub struct MetricsSink {
    tx: Option<mpsc::Sender<MetricEvent>>,
}

impl MetricsSink {
    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue an event. Never waits.
    pub fn record(&self, event: MetricEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics::counter!("router_metric_events_dropped_total").increment(1);
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

/// Consumer side of the metric queue.
pub struct MetricsPipeline {
    rx: mpsc::Receiver<MetricEvent>,
}

/// Create a bounded sink/consumer pair.
pub fn pipeline(capacity: usize) -> (MetricsSink, MetricsPipeline) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (MetricsSink { tx: Some(tx) }, MetricsPipeline { rx })
}

impl MetricsPipeline {
    /// Apply events until every sink is dropped or shutdown is signalled.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                event = self.rx.recv() => match event {
                    Some(event) => apply(event),
                    None => break,
                },
                _ = shutdown.recv() => {
                    while let Ok(event) = self.rx.try_recv() {
                        apply(event);
                    }
                    break;
                }
            }
        }
        tracing::debug!("Metrics pipeline stopped");
    }

    /// Next queued event, if any, without applying it.
    #[cfg(test)]
    pub(crate) fn try_next(&mut self) -> Option<MetricEvent> {
        self.rx.try_recv().ok()
    }
}

fn route_labels(route: &MessageRoute) -> [(&'static str, String); 4] {
    [
        ("source", route.source.clone()),
        ("group", route.group.clone()),
        ("operation", route.operation.clone()),
        ("resource", route.resource.clone()),
    ]
}

fn node_route_labels(node_id: &str, route: &MessageRoute) -> Vec<(&'static str, String)> {
    let mut labels = vec![("node_id", node_id.to_string())];
    labels.extend(route_labels(route));
    labels
}

fn apply(event: MetricEvent) {
    match event {
        MetricEvent::MessageTransmitted { node_id, route } => {
            metrics::counter!("router_transmit_message_count", &node_route_labels(&node_id, &route))
                .increment(1);
        }
        MetricEvent::MessageReceived { node_id, route } => {
            metrics::counter!("router_receive_message_count", &node_route_labels(&node_id, &route))
                .increment(1);
        }
        MetricEvent::HandleDuration { route, seconds } => {
            metrics::histogram!("router_message_handle_duration_seconds", &route_labels(&route))
                .record(seconds);
        }
        MetricEvent::SendDuration { route, seconds } => {
            metrics::histogram!("router_message_send_duration_seconds", &route_labels(&route))
                .record(seconds);
        }
        MetricEvent::NodeQueue { node_id, depth } => {
            metrics::gauge!("router_node_queue_length", "node_id" => node_id).set(depth as f64);
        }
        MetricEvent::ChannelLength { module, length } => {
            metrics::gauge!("router_bus_channel_length", "module" => module).set(length as f64);
        }
        MetricEvent::HttpRequest { outcome, status } => {
            metrics::counter!(
                "router_http_requests_total",
                "outcome" => outcome,
                "status" => status.to_string()
            )
            .increment(1);
        }
    }
}

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Suffix("_duration_seconds".to_string()),
            &DURATION_BUCKETS,
        )?
        .install()?;

    tracing::info!(%addr, "Metrics server listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> MessageRoute {
        MessageRoute {
            source: "router".into(),
            group: "twin".into(),
            operation: "update".into(),
            resource: "/n/twin/update".into(),
        }
    }

    #[tokio::test]
    async fn test_events_reach_consumer() {
        let (sink, mut pipeline) = pipeline(8);
        sink.record(MetricEvent::NodeQueue { node_id: "n".into(), depth: 2 });
        assert_eq!(
            pipeline.rx.recv().await,
            Some(MetricEvent::NodeQueue { node_id: "n".into(), depth: 2 })
        );
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (sink, mut pipeline) = pipeline(1);
        sink.record(MetricEvent::HandleDuration { route: route(), seconds: 0.1 });
        sink.record(MetricEvent::HandleDuration { route: route(), seconds: 0.2 });
        sink.record(MetricEvent::HandleDuration { route: route(), seconds: 0.3 });

        assert!(matches!(
            pipeline.rx.try_recv(),
            Ok(MetricEvent::HandleDuration { seconds, .. }) if seconds == 0.1
        ));
        assert!(pipeline.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_drains_on_shutdown() {
        let (sink, pipeline) = pipeline(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        for i in 0..5 {
            sink.record(MetricEvent::ChannelLength { module: "router".into(), length: i });
        }
        let handle = tokio::spawn(pipeline.run(shutdown_rx));
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn test_disabled_sink_is_noop() {
        MetricsSink::disabled().record(MetricEvent::HttpRequest { outcome: "local", status: 200 });
    }
}
