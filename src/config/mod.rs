//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RouterConfig (validated, immutable)
//!     → shared with all subsystems at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → lifecycle applies reloadable parts (timeout, node seeds, rules)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Non-positive port/timeouts mean "use the default"
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BusConfig, ListenerConfig, NodeConfig, ObservabilityConfig, RegistryConfig, RouterConfig,
    RuleConfig, TimeoutConfig,
};
