//! Handler that bridges a request onto the message bus.

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Instant;

use crate::bridge::handler::{Handler, HandlerError, HandlerRequest, HandlerResponse};
use crate::bus::{HttpReply, Message, MessageBus, MessageRoute};
use crate::observability::{MetricEvent, MetricsSink};

/// Sends one bus message per request and decodes the correlated reply.
pub struct BusHandler {
    bus: Arc<dyn MessageBus>,
    source: String,
    group: String,
    metrics: MetricsSink,
}

impl BusHandler {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        source: impl Into<String>,
        group: impl Into<String>,
        metrics: MetricsSink,
    ) -> Self {
        Self {
            bus,
            source: source.into(),
            group: group.into(),
            metrics,
        }
    }

    fn route_for(&self, request: &HandlerRequest) -> MessageRoute {
        MessageRoute {
            source: self.source.clone(),
            group: self.group.clone(),
            operation: operation_for(&request.parts.method),
            resource: request.parts.uri.path().to_string(),
        }
    }
}

/// Bus operation for an HTTP method.
pub fn operation_for(method: &Method) -> String {
    match *method {
        Method::GET => "query".to_string(),
        Method::POST => "insert".to_string(),
        Method::PUT | Method::PATCH => "update".to_string(),
        Method::DELETE => "delete".to_string(),
        _ => method.as_str().to_lowercase(),
    }
}

/// Turn a reply message into a handler response.
///
/// Content that is an [`HttpReply`] document is used as is; anything else is
/// a `200` carrying the raw content.
pub fn decode_reply(reply: &Message) -> Result<HandlerResponse, HandlerError> {
    let Ok(http) = serde_json::from_slice::<HttpReply>(&reply.content) else {
        return Ok(HandlerResponse::ok(reply.content.clone()));
    };

    let status = StatusCode::from_u16(http.status)
        .map_err(|_| HandlerError::InvalidReply(format!("status {}", http.status)))?;

    let mut headers = HeaderMap::new();
    for (name, values) in &http.headers {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            tracing::warn!(message_id = %reply.id(), header = %name, "Invalid reply header name skipped");
            continue;
        };
        for value in values {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.append(name.clone(), value);
                }
                Err(_) => {
                    tracing::warn!(message_id = %reply.id(), header = %name, "Invalid reply header value skipped");
                }
            }
        }
    }

    Ok(HandlerResponse {
        status,
        headers,
        body: http.body.into(),
    })
}

impl Handler for BusHandler {
    fn invoke(&self, request: HandlerRequest) -> BoxFuture<'static, Result<HandlerResponse, HandlerError>> {
        let bus = Arc::clone(&self.bus);
        let metrics = self.metrics.clone();
        let route = self.route_for(&request);

        Box::pin(async move {
            let node_id = request.node_id;
            let message = Message::new(request.request_id, route.clone(), request.body.to_vec());
            let message_id = message.id().to_string();

            metrics.record(MetricEvent::MessageTransmitted {
                node_id: node_id.clone(),
                route: route.clone(),
            });
            let started = Instant::now();

            let reply = bus.send_sync(message, request.timeout).await?;

            metrics.record(MetricEvent::MessageReceived {
                node_id,
                route: route.clone(),
            });
            metrics.record(MetricEvent::HandleDuration {
                route,
                seconds: started.elapsed().as_secs_f64(),
            });
            tracing::debug!(message_id = %message_id, reply_id = %reply.id(), "Reply received");

            decode_reply(&reply)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ChannelBus;
    use axum::body::Bytes;
    use axum::http::Request;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn handler_request(method: &str, path: &str, timeout: Duration) -> HandlerRequest {
        let (parts, _) = Request::builder()
            .method(method)
            .uri(path)
            .body(())
            .unwrap()
            .into_parts();
        HandlerRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            node_id: "node1".into(),
            pattern: "/{node}/twin/update".into(),
            parts,
            body: Bytes::from_static(b"{\"desired\":1}"),
            timeout,
        }
    }

    #[test]
    fn test_operation_mapping() {
        assert_eq!(operation_for(&Method::GET), "query");
        assert_eq!(operation_for(&Method::POST), "insert");
        assert_eq!(operation_for(&Method::PATCH), "update");
        assert_eq!(operation_for(&Method::DELETE), "delete");
        assert_eq!(operation_for(&Method::OPTIONS), "options");
    }

    #[test]
    fn test_decode_raw_reply() {
        let reply = Message::new("r", MessageRoute::default(), b"plain".to_vec());
        let resp = decode_reply(&reply).unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body, Bytes::from_static(b"plain"));
    }

    #[test]
    fn test_decode_structured_reply() {
        let mut headers = BTreeMap::new();
        headers.insert("x-twin".to_string(), vec!["a".to_string(), "b".to_string()]);
        headers.insert("bad header".to_string(), vec!["x".to_string()]);
        let content = HttpReply { status: 202, headers, body: "queued".into() }.to_content();

        let resp = decode_reply(&Message::new("r", MessageRoute::default(), content)).unwrap();
        assert_eq!(resp.status, StatusCode::ACCEPTED);
        assert_eq!(resp.headers.get_all("x-twin").iter().count(), 2);
        assert_eq!(resp.headers.len(), 2);
        assert_eq!(resp.body, Bytes::from_static(b"queued"));
    }

    #[test]
    fn test_decode_invalid_status() {
        let content = HttpReply { status: 1000, headers: BTreeMap::new(), body: String::new() }.to_content();
        let err = decode_reply(&Message::new("r", MessageRoute::default(), content)).unwrap_err();
        assert!(matches!(err, HandlerError::InvalidReply(_)));
    }

    #[tokio::test]
    async fn test_invoke_round_trip_over_channel_bus() {
        let (bus, mut rx) = ChannelBus::new("router", 8, MetricsSink::disabled());
        let responder = bus.clone();
        let seen = tokio::spawn(async move {
            let msg = rx.recv().await.unwrap();
            let content = HttpReply { status: 200, headers: BTreeMap::new(), body: "ok".into() }.to_content();
            responder.deliver(msg.reply(content));
            msg
        });

        let handler = BusHandler::new(Arc::new(bus), "router", "twin", MetricsSink::disabled());
        let request = handler_request("PUT", "/node1/twin/update?x=1", Duration::from_secs(1));
        let request_id = request.request_id.clone();
        let resp = handler.invoke(request).await.unwrap();

        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body, Bytes::from_static(b"ok"));

        let sent = seen.await.unwrap();
        assert_eq!(sent.id(), request_id);
        assert_eq!(sent.route.operation, "update");
        assert_eq!(sent.route.resource, "/node1/twin/update");
        assert_eq!(sent.route.group, "twin");
        assert_eq!(sent.content, b"{\"desired\":1}");
    }

    #[tokio::test]
    async fn test_invoke_records_route_metrics() {
        let (sink, mut events) = crate::observability::metrics::pipeline(16);
        let (bus, mut rx) = ChannelBus::new("router", 8, sink.clone());
        let responder = bus.clone();
        tokio::spawn(async move {
            let msg = rx.recv().await.unwrap();
            responder.deliver(msg.reply(b"ok".to_vec()));
        });

        let handler = BusHandler::new(Arc::new(bus), "router", "twin", sink);
        handler
            .invoke(handler_request("PUT", "/node1/twin/update", Duration::from_secs(1)))
            .await
            .unwrap();

        let route = MessageRoute {
            source: "router".into(),
            group: "twin".into(),
            operation: "update".into(),
            resource: "/node1/twin/update".into(),
        };
        assert_eq!(
            events.try_next(),
            Some(MetricEvent::MessageTransmitted { node_id: "node1".into(), route: route.clone() })
        );
        assert!(matches!(events.try_next(), Some(MetricEvent::SendDuration { route: r, .. }) if r == route));
        assert_eq!(
            events.try_next(),
            Some(MetricEvent::MessageReceived { node_id: "node1".into(), route: route.clone() })
        );
        assert!(matches!(events.try_next(), Some(MetricEvent::HandleDuration { route: r, .. }) if r == route));
        assert_eq!(events.try_next(), None);
    }

    #[tokio::test]
    async fn test_invoke_times_out() {
        let (bus, _rx) = ChannelBus::new("router", 8, MetricsSink::disabled());
        let handler = BusHandler::new(Arc::new(bus), "router", "twin", MetricsSink::disabled());
        let err = handler
            .invoke(handler_request("GET", "/node1/twin/update", Duration::from_millis(30)))
            .await
            .unwrap_err();
        assert_eq!(err, HandlerError::Timeout(Duration::from_millis(30)));
    }
}
