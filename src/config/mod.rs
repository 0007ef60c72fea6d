//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → PeriodicSynchronizer::signal_change()
//!     → next tick: FileDeltaSource re-reads [[routes]] and diffs
//!     → RouteTable updated route by route
//! ```
//!
//! # Design Decisions
//! - Listener, matcher and observability settings are read once at startup
//! - Only routes are hot-reloaded, through the synchronizer
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    FilterDefinition, GatewayConfig, ListenerConfig, LogFormat, MatcherConfig, ObservabilityConfig,
    RouteDefinition, SyncConfig,
};
pub use validation::ValidationError;
pub use watcher::ConfigWatcher;
