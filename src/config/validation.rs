//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check addresses and URLs parse
//! - Check rule patterns compile
//! - Detect duplicate node seeds and rule patterns
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;
use url::Url;

use crate::config::schema::RouterConfig;
use crate::routing::Pattern;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.address is not an IP address: {0}")]
    InvalidBindAddress(String),

    #[error("listener.port out of range: {0}")]
    PortOutOfRange(i64),

    #[error("listener.advertise_url is not a valid URL: {0}")]
    InvalidAdvertiseUrl(String),

    #[error("observability.metrics_address is not a socket address: {0}")]
    InvalidMetricsAddress(String),

    #[error("node '{id}' has an invalid router_url: {url}")]
    InvalidNodeUrl { id: String, url: String },

    #[error("node '{0}' is declared more than once")]
    DuplicateNode(String),

    #[error("rule pattern '{pattern}' is invalid: {reason}")]
    InvalidRulePattern { pattern: String, reason: String },

    #[error("rule pattern '{0}' is declared more than once")]
    DuplicateRule(String),

    #[error("rule '{0}' has an empty group")]
    EmptyRuleGroup(String),

    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.address.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(config.listener.address.clone()));
    }
    if config.listener.port > u16::MAX as i64 {
        errors.push(ValidationError::PortOutOfRange(config.listener.port));
    }
    if let Some(url) = &config.listener.advertise_url {
        if Url::parse(url).is_err() {
            errors.push(ValidationError::InvalidAdvertiseUrl(url.clone()));
        }
    }
    if config.listener.max_inflight_requests == 0 {
        errors.push(ValidationError::ZeroCapacity("listener.max_inflight_requests"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }
    if config.observability.metrics_queue == 0 {
        errors.push(ValidationError::ZeroCapacity("observability.metrics_queue"));
    }
    if config.bus.capacity == 0 {
        errors.push(ValidationError::ZeroCapacity("bus.capacity"));
    }

    let mut seen = HashSet::new();
    for node in &config.nodes {
        if !seen.insert(node.id.as_str()) {
            errors.push(ValidationError::DuplicateNode(node.id.clone()));
        }
        if Url::parse(&node.router_url).is_err() {
            errors.push(ValidationError::InvalidNodeUrl {
                id: node.id.clone(),
                url: node.router_url.clone(),
            });
        }
    }

    let mut seen = HashSet::new();
    for rule in &config.rules {
        if !seen.insert(rule.pattern.as_str()) {
            errors.push(ValidationError::DuplicateRule(rule.pattern.clone()));
        }
        if let Err(e) = Pattern::parse(&rule.pattern) {
            errors.push(ValidationError::InvalidRulePattern {
                pattern: rule.pattern.clone(),
                reason: e.to_string(),
            });
        }
        if rule.group.is_empty() {
            errors.push(ValidationError::EmptyRuleGroup(rule.pattern.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
