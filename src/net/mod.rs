//! Network identity.
//!
//! # Data Flow
//! ```text
//! ListenerConfig (address, port, advertise_url)
//!     → address.rs (wildcard → hostname-resolved IP)
//!     → own router URL
//!     → authority resolver compares it with node annotations
//! ```

pub mod address;

pub use address::own_router_url;
