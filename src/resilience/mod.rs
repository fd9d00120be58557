//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Bridged handler call / proxied upstream call:
//!     → timeouts.rs (enforce deadline)
//!     → On expiry: caller maps to 504
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries here: a failed forward is reported, not repeated

pub mod timeouts;

pub use timeouts::{with_deadline, DeadlineExceeded};
