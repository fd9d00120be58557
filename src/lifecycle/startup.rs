//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize metrics, the bus, the node inventory and the pattern registry
//! - Register configured rules as bus-backed handlers
//! - Apply hot-reloaded configuration (timeout, node seeds, rules)
//! - Bind the listener and serve until a termination signal
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)
//! - A reload never touches the listener; address changes need a restart

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::authority::InMemoryNodeRegistry;
use crate::bridge::{BusHandler, Handler};
use crate::bus::{ChannelBus, Message, MessageBus};
use crate::config::watcher::ConfigWatcher;
use crate::config::{RouterConfig, RuleConfig};
use crate::http::{AppState, HttpServer};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::wait_for_termination;
use crate::observability::metrics::{init_metrics, pipeline};
use crate::observability::MetricsSink;
use crate::routing::PatternRegistry;

/// How often the bus channel depth gauge is sampled.
pub const CHANNEL_SAMPLE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid metrics address {0}")]
    MetricsAddress(String),

    #[error("failed to install metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to watch config file: {0}")]
    Watcher(#[from] notify::Error),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Everything the front door needs, plus the bus receiver for the consuming module.
pub struct Services {
    pub config: RouterConfig,
    pub patterns: Arc<PatternRegistry<dyn Handler>>,
    pub nodes: InMemoryNodeRegistry,
    pub bus: ChannelBus,
    pub outbound: mpsc::Receiver<Message>,
    pub state: AppState,
}

/// Wire the subsystems together from `config`.
pub fn build(config: RouterConfig, metrics: MetricsSink) -> Services {
    let (bus, outbound) = ChannelBus::new(config.bus.module.clone(), config.bus.capacity, metrics.clone());
    let nodes = InMemoryNodeRegistry::from_config(&config.nodes, &config.registry.router_url_annotation);

    let patterns: Arc<PatternRegistry<dyn Handler>> = Arc::new(PatternRegistry::new());
    apply_rules(&patterns, &bus, &metrics, &[], &config.rules);

    let state = AppState::new(&config, Arc::new(nodes.clone()), Arc::clone(&patterns), metrics);

    Services {
        config,
        patterns,
        nodes,
        bus,
        outbound,
        state,
    }
}

/// Replace the rules in `previous` with `rules`.
///
/// Patterns only in `previous` are unregistered; every pattern in `rules` is
/// (re)registered with a fresh bus handler. Returns how many were registered.
pub fn apply_rules(
    patterns: &PatternRegistry<dyn Handler>,
    bus: &ChannelBus,
    metrics: &MetricsSink,
    previous: &[RuleConfig],
    rules: &[RuleConfig],
) -> usize {
    let keep: HashSet<&str> = rules.iter().map(|r| r.pattern.as_str()).collect();
    for old in previous.iter().filter(|r| !keep.contains(r.pattern.as_str())) {
        patterns.unregister(&old.pattern);
    }

    let mut registered = 0;
    for rule in rules {
        let source = rule.source.clone().unwrap_or_else(|| bus.module().to_string());
        let bus: Arc<dyn MessageBus> = Arc::new(bus.clone());
        let handler: Arc<dyn Handler> = Arc::new(BusHandler::new(bus, source, rule.group.clone(), metrics.clone()));

        match patterns.register(&rule.pattern, handler) {
            Ok(_) => registered += 1,
            Err(e) => tracing::error!(pattern = %rule.pattern, error = %e, "Rule not registered"),
        }
    }

    tracing::info!(rules = registered, patterns = patterns.len(), "Rules applied");
    registered
}

/// Apply a reloaded configuration to the running services.
///
/// The annotation key is swapped before the inventory is reseeded so that
/// lookups never mix the old key with the new seeds.
pub fn apply_reload(
    state: &AppState,
    nodes: &InMemoryNodeRegistry,
    patterns: &PatternRegistry<dyn Handler>,
    bus: &ChannelBus,
    metrics: &MetricsSink,
    current: &RouterConfig,
    next: &RouterConfig,
) {
    let annotation = &next.registry.router_url_annotation;
    state.bridge.set_timeout(next.timeouts.request_timeout());
    state.resolver.set_annotation_key(annotation.as_str());
    nodes.reseed(&next.nodes, annotation);
    apply_rules(patterns, bus, metrics, &current.rules, &next.rules);

    tracing::info!(
        request_timeout_secs = state.bridge.timeout().as_secs(),
        annotation = %annotation,
        "Configuration reloaded"
    );
}

/// Run the router until a termination signal.
pub async fn run(config: RouterConfig, config_path: Option<PathBuf>) -> Result<(), StartupError> {
    let shutdown = Shutdown::new();

    let metrics = if config.observability.metrics_enabled {
        let addr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        init_metrics(addr)?;

        let (sink, consumer) = pipeline(config.observability.metrics_queue);
        tokio::spawn(consumer.run(shutdown.subscribe()));
        sink
    } else {
        MetricsSink::disabled()
    };

    let Services {
        config,
        patterns,
        nodes,
        bus,
        outbound,
        state,
    } = build(config, metrics.clone());

    tokio::spawn(drain_unconsumed(outbound));
    tokio::spawn(bus.clone().run_channel_sampler(CHANNEL_SAMPLE_INTERVAL, shutdown.subscribe()));

    // The notify watcher stops when dropped; keep it for the server's lifetime.
    let _watcher = match config_path {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(&path);
            let guard = watcher.run()?;

            let state = state.clone();
            let patterns = Arc::clone(&patterns);
            let mut current = config.clone();
            tokio::spawn(async move {
                while let Some(next) = updates.recv().await {
                    apply_reload(&state, &nodes, &patterns, &bus, &metrics, &current, &next);
                    current = next;
                }
            });
            Some(guard)
        }
        None => None,
    };

    tokio::spawn(wait_for_termination(shutdown.clone()));

    let address = config.listener.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;

    HttpServer::new(&config, state)
        .run(listener, shutdown.subscribe())
        .await
        .map_err(StartupError::Serve)?;

    shutdown.trigger();
    Ok(())
}

/// Consume the outbound queue when no module is attached to it.
async fn drain_unconsumed(mut outbound: mpsc::Receiver<Message>) {
    while let Some(message) = outbound.recv().await {
        tracing::debug!(
            message_id = %message.id(),
            group = %message.route.group,
            operation = %message.route.operation,
            resource = %message.route.resource,
            "No bus consumer attached, message dropped"
        );
    }
}
