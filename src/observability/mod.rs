//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (MetricsSink → bounded queue → single consumer → recorder)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - `x-request-id` is set at the front door; bridge events carry their own request id
//! - Metric recording never waits on the collector

pub mod logging;
pub mod metrics;

pub use metrics::{MetricEvent, MetricsSink};
