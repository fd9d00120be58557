//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (load registry snapshot)
//!     → matcher.rs (evaluate every pattern, rank matches by specificity)
//!     → Return: winning pattern + handler, or no match (404)
//!
//! Registration (any time, from any subsystem):
//!     register(pattern, handler)
//!     → matcher.rs compiles the pattern (rejects invalid ones)
//!     → router.rs swaps in a new snapshot
//! ```
//!
//! # Design Decisions
//! - Routes are mutable at runtime; readers work on immutable snapshots
//! - No regex in hot path (segment comparison only)
//! - Deterministic: one evaluation always yields exactly one winner or none
//! - Most specific pattern wins, not registration order

pub mod matcher;
pub mod router;

pub use matcher::{Pattern, PatternError};
pub use router::{Matched, PatternRegistry};
