//! This instance's advertised router URL.
//!
//! # Responsibilities
//! - Derive `http://{ip}:{port}` from the configured bind address
//! - Replace the wildcard bind address with a routable local IP
//!
//! # Design Decisions
//! - Local IP comes from resolving the machine hostname (first non-loopback IPv4)
//! - Falls back to loopback rather than failing startup
//! - An explicit `advertise_url` always wins

use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};

use crate::config::ListenerConfig;

/// Bind address that means "all interfaces".
pub const WILDCARD_ADDRESS: &str = "0.0.0.0";

/// Compute the URL other instances see for this router.
pub fn own_router_url(listener: &ListenerConfig) -> String {
    if let Some(url) = listener.advertise_url.as_deref().filter(|u| !u.is_empty()) {
        return url.to_string();
    }

    let host = if listener.address == WILDCARD_ADDRESS {
        match local_ip() {
            IpAddr::V4(ip) => ip.to_string(),
            IpAddr::V6(ip) => format!("[{}]", ip),
        }
    } else {
        listener.address.clone()
    };
    format!("http://{}:{}", host, listener.effective_port())
}

/// Best-effort routable IP of this machine.
pub fn local_ip() -> IpAddr {
    let hostname = match hostname::get() {
        Ok(h) => h.to_string_lossy().to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read hostname, using loopback");
            return IpAddr::V4(Ipv4Addr::LOCALHOST);
        }
    };

    match resolve_non_loopback(&hostname) {
        Some(ip) => ip,
        None => {
            tracing::warn!(hostname = %hostname, "No routable address for hostname, using loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

fn resolve_non_loopback(hostname: &str) -> Option<IpAddr> {
    let addrs: Vec<IpAddr> = (hostname, 0u16)
        .to_socket_addrs()
        .ok()?
        .map(|sa| sa.ip())
        .filter(|ip| !ip.is_loopback() && !ip.is_unspecified())
        .collect();

    addrs
        .iter()
        .copied()
        .find(IpAddr::is_ipv4)
        .or_else(|| addrs.first().copied())
}
