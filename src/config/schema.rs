//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the router.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default listener port.
pub const DEFAULT_PORT: u16 = 9443;

/// Default time to wait for a correlated bus reply, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

const DEFAULT_PROXY_CONNECT_SECS: u64 = 10;
const DEFAULT_PROXY_RESPONSE_SECS: u64 = 60;

/// Root configuration for the router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Listener configuration (bind address, port).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Node inventory settings.
    pub registry: RegistryConfig,

    /// In-process message bus settings.
    pub bus: BusConfig,

    /// Static node seeds for the in-memory inventory.
    pub nodes: Vec<NodeConfig>,

    /// Patterns bridged onto the message bus.
    pub rules: Vec<RuleConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0").
    pub address: String,

    /// Bind port. Non-positive means the default (9443).
    pub port: i64,

    /// Requests served concurrently; further requests wait for a slot.
    #[serde(alias = "max_connections")]
    pub max_inflight_requests: usize,

    /// URL advertised to peers. Derived from address/port when unset.
    pub advertise_url: Option<String>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT as i64,
            max_inflight_requests: 10_000,
            advertise_url: None,
        }
    }
}

impl ListenerConfig {
    /// The port actually used.
    pub fn effective_port(&self) -> u16 {
        u16::try_from(self.port)
            .ok()
            .filter(|p| *p > 0)
            .unwrap_or(DEFAULT_PORT)
    }

    /// `address:port` to bind to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.effective_port())
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time to wait for a correlated bus reply, in seconds.
    pub request_secs: i64,

    /// Proxy connection establishment timeout in seconds.
    pub proxy_connect_secs: i64,

    /// Time to wait for proxied response headers, in seconds.
    pub proxy_response_secs: i64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: DEFAULT_REQUEST_TIMEOUT_SECS as i64,
            proxy_connect_secs: DEFAULT_PROXY_CONNECT_SECS as i64,
            proxy_response_secs: DEFAULT_PROXY_RESPONSE_SECS as i64,
        }
    }
}

fn positive_secs(value: i64, default: u64) -> Duration {
    Duration::from_secs(if value > 0 { value as u64 } else { default })
}

impl TimeoutConfig {
    pub fn request_timeout(&self) -> Duration {
        positive_secs(self.request_secs, DEFAULT_REQUEST_TIMEOUT_SECS)
    }

    pub fn proxy_connect_timeout(&self) -> Duration {
        positive_secs(self.proxy_connect_secs, DEFAULT_PROXY_CONNECT_SECS)
    }

    pub fn proxy_response_timeout(&self) -> Duration {
        positive_secs(self.proxy_response_secs, DEFAULT_PROXY_RESPONSE_SECS)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Capacity of the metric event queue.
    pub metrics_queue: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9091".to_string(),
            metrics_queue: 4096,
        }
    }
}

/// Node inventory configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Node annotation holding the authoritative router URL.
    pub router_url_annotation: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            router_url_annotation: "edge.router/authoritative-url".to_string(),
        }
    }
}

/// In-process message bus configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BusConfig {
    /// Outbound queue capacity.
    pub capacity: usize,

    /// Module name used as the message source and gauge label.
    pub module: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            module: "router".to_string(),
        }
    }
}

/// A node seeded into the in-memory inventory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NodeConfig {
    /// Node identifier.
    pub id: String,

    /// Base URL of the node's authoritative router.
    pub router_url: String,
}

/// A path pattern bridged onto the message bus.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RuleConfig {
    /// Path pattern (e.g., "/{node}/twin/update").
    pub pattern: String,

    /// Source module name carried on the message. Defaults to the bus module.
    #[serde(default)]
    pub source: Option<String>,

    /// Destination group.
    pub group: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RouterConfig::default();
        assert_eq!(config.listener.bind_address(), "0.0.0.0:9443");
        assert_eq!(config.timeouts.request_timeout(), Duration::from_secs(60));
        assert!(config.nodes.is_empty());
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_non_positive_values_fall_back() {
        let listener = ListenerConfig {
            port: -1,
            ..Default::default()
        };
        assert_eq!(listener.effective_port(), 9443);

        let timeouts = TimeoutConfig {
            request_secs: 0,
            proxy_connect_secs: -5,
            proxy_response_secs: 3,
        };
        assert_eq!(timeouts.request_timeout(), Duration::from_secs(60));
        assert_eq!(timeouts.proxy_connect_timeout(), Duration::from_secs(10));
        assert_eq!(timeouts.proxy_response_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: RouterConfig = toml::from_str(
            r#"
            [listener]
            address = "10.0.0.5"

            [timeouts]
            request_secs = 5

            [[nodes]]
            id = "node1"
            router_url = "http://10.0.0.9:9443"

            [[rules]]
            pattern = "/{node}/twin/update"
            group = "twin"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address(), "10.0.0.5:9443");
        assert_eq!(config.timeouts.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.nodes[0].id, "node1");
        assert_eq!(config.rules[0].group, "twin");
        assert!(config.rules[0].source.is_none());
        assert_eq!(config.bus.module, "router");
    }

    #[test]
    fn test_inflight_limit_accepts_legacy_key() {
        let config: RouterConfig = toml::from_str("[listener]\nmax_inflight_requests = 64\n").unwrap();
        assert_eq!(config.listener.max_inflight_requests, 64);

        let config: RouterConfig = toml::from_str("[listener]\nmax_connections = 32\n").unwrap();
        assert_eq!(config.listener.max_inflight_requests, 32);
    }
}
