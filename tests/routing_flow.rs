//! End-to-end routing tests: local bridging, forwarding, and rejections.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cloud_router::authority::{InMemoryNodeRegistry, Node};
use cloud_router::bridge::{Handler, HandlerError, HandlerRequest, HandlerResponse};
use cloud_router::bus::HttpReply;
use cloud_router::config::{NodeConfig, RuleConfig};
use cloud_router::http::AppState;
use cloud_router::lifecycle::{self, Services};
use cloud_router::observability::MetricsSink;
use cloud_router::routing::PatternRegistry;

mod common;

fn counting_handler(calls: Arc<AtomicUsize>) -> Arc<dyn Handler> {
    Arc::new(move |_req: HandlerRequest| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<_, HandlerError>(HandlerResponse::ok("ok")) }
    })
}

#[tokio::test]
async fn test_local_request_is_handled() {
    let port = 28301;
    let config = common::router_config(port);
    let own_url = format!("http://127.0.0.1:{port}");

    let nodes = InMemoryNodeRegistry::new();
    nodes.upsert(Node::new("node1").with_annotation(common::ANNOTATION, &own_url));

    let calls = Arc::new(AtomicUsize::new(0));
    let patterns: Arc<PatternRegistry<dyn Handler>> = Arc::new(PatternRegistry::new());
    patterns.register("/node1/twin/update", counting_handler(calls.clone())).unwrap();

    let state = AppState::new(&config, Arc::new(nodes), patterns, MetricsSink::disabled());
    let shutdown = common::start_router(&config, state).await;

    let res = common::client()
        .get(format!("{own_url}/node1/twin/update"))
        .send()
        .await
        .expect("Router unreachable");
    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    shutdown.trigger();
}

#[tokio::test]
async fn test_rejections_never_reach_handler_or_peer() {
    let port = 28302;
    let config = common::router_config(port);
    let own_url = format!("http://127.0.0.1:{port}");

    let nodes = InMemoryNodeRegistry::new();
    nodes.upsert(Node::new("node1").with_annotation(common::ANNOTATION, &own_url));
    nodes.upsert(Node::new("unadvertised"));

    let calls = Arc::new(AtomicUsize::new(0));
    let patterns: Arc<PatternRegistry<dyn Handler>> = Arc::new(PatternRegistry::new());
    patterns.register("/{node}/twin/update", counting_handler(calls.clone())).unwrap();

    let state = AppState::new(&config, Arc::new(nodes), patterns, MetricsSink::disabled());
    let shutdown = common::start_router(&config, state).await;
    let client = common::client();

    for (path, body) in [
        ("/node1", "Request error"),
        ("/node1/device/list", "Request error"),
        ("/ghost/twin/update", "No rule match"),
        ("/unadvertised/twin/update", "No rule match"),
    ] {
        let res = client.get(format!("{own_url}{path}")).send().await.unwrap();
        assert_eq!(res.status(), 404, "path {path}");
        assert_eq!(res.text().await.unwrap(), body, "path {path}");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    shutdown.trigger();
}

#[tokio::test]
async fn test_non_authoritative_request_is_forwarded() {
    let port = 28303;
    let peer_addr: SocketAddr = "127.0.0.1:28304".parse().unwrap();
    common::start_echo_peer(peer_addr).await;

    let config = common::router_config(port);
    let own_url = format!("http://127.0.0.1:{port}");

    let nodes = InMemoryNodeRegistry::new();
    nodes.upsert(Node::new("node2").with_annotation(common::ANNOTATION, format!("http://{peer_addr}")));

    let calls = Arc::new(AtomicUsize::new(0));
    let patterns: Arc<PatternRegistry<dyn Handler>> = Arc::new(PatternRegistry::new());
    patterns.register("/{node}/twin/update", counting_handler(calls.clone())).unwrap();

    let state = AppState::new(&config, Arc::new(nodes), patterns, MetricsSink::disabled());
    let shutdown = common::start_router(&config, state).await;

    let res = common::client()
        .post(format!("{own_url}/node2/twin/update"))
        .body("desired-state")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-peer"], "1");
    assert_eq!(
        res.text().await.unwrap(),
        format!("127.0.0.1:{port}|/node2/twin/update|desired-state")
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_peer_is_bad_gateway() {
    let port = 28305;
    let mut config = common::router_config(port);
    config.timeouts.proxy_connect_secs = 1;
    config.nodes.push(NodeConfig {
        id: "node3".into(),
        router_url: "http://127.0.0.1:28306".into(),
    });
    config.rules.push(RuleConfig {
        pattern: "/{node}/twin/*".into(),
        source: None,
        group: "twin".into(),
    });

    let Services { state, .. } = lifecycle::build(config.clone(), MetricsSink::disabled());
    let shutdown = common::start_router(&config, state).await;

    let res = common::client()
        .get(format!("http://127.0.0.1:{port}/node3/twin/update"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 502);

    shutdown.trigger();
}

#[tokio::test]
async fn test_bus_rule_reply_is_returned() {
    let port = 28307;
    let mut config = common::router_config(port);
    config.nodes.push(NodeConfig {
        id: "node1".into(),
        router_url: format!("http://127.0.0.1:{port}"),
    });
    config.rules.push(RuleConfig {
        pattern: "/{node}/twin/update".into(),
        source: None,
        group: "twin".into(),
    });

    let Services { state, bus, mut outbound, .. } = lifecycle::build(config.clone(), MetricsSink::disabled());
    tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            let mut headers = BTreeMap::new();
            headers.insert("x-operation".to_string(), vec![msg.route.operation.clone()]);
            let content = HttpReply {
                status: 202,
                headers,
                body: String::from_utf8_lossy(&msg.content).into_owned(),
            }
            .to_content();
            bus.deliver(msg.reply(content));
        }
    });
    let shutdown = common::start_router(&config, state).await;

    let res = common::client()
        .put(format!("http://127.0.0.1:{port}/node1/twin/update"))
        .body("{\"desired\":true}")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 202);
    assert_eq!(res.headers()["x-operation"], "update");
    assert_eq!(res.text().await.unwrap(), "{\"desired\":true}");

    shutdown.trigger();
}

#[tokio::test]
async fn test_unanswered_bus_request_times_out() {
    let port = 28308;
    let mut config = common::router_config(port);
    config.timeouts.request_secs = 1;
    config.nodes.push(NodeConfig {
        id: "node1".into(),
        router_url: format!("http://127.0.0.1:{port}"),
    });
    config.rules.push(RuleConfig {
        pattern: "/{node}/twin/update".into(),
        source: None,
        group: "twin".into(),
    });

    // Keep the receiver alive but never answer.
    let Services { state, outbound: _outbound, .. } = lifecycle::build(config.clone(), MetricsSink::disabled());
    let shutdown = common::start_router(&config, state).await;

    let started = Instant::now();
    let res = common::client()
        .get(format!("http://127.0.0.1:{port}/node1/twin/update"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 504);
    assert!(started.elapsed() < Duration::from_secs(3));

    shutdown.trigger();
}
