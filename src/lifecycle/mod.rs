//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Logging/metrics → Route table
//!     → Synchronizer (first tick pulls all routes) → Watcher → Listener
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C → Shutdown::trigger → server drains, ticker exits
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - One broadcast channel for every long-running task

pub mod shutdown;

pub use shutdown::Shutdown;
