//! Route synchronization subsystem.
//!
//! # Data Flow
//! ```text
//! signal_change() × N          (config watcher, control-plane push, ...)
//!     → periodic.rs: dirty flag (coalesces bursts)
//!     → ticker fires: test-and-clear dirty
//!     → synchronizer.rs: request_update()
//!         → DeltaSource::fetch() → Vec<RouteDelta>
//!         → Upsert → RouteTable::add, Delete → RouteTable::remove_by_id
//!         → Heartbeat / missing id / unknown delete → ignored
//!     → SyncReport
//! ```
//!
//! # Design Decisions
//! - At most one fetch per period regardless of notification volume
//! - The first tick after start always pulls (cold-start consistency)
//! - A feed error never touches the table; the pass is retried next tick

pub mod delta;
pub mod file;
pub mod periodic;
pub mod synchronizer;

pub use delta::{DeltaSource, RouteDelta};
pub use file::FileDeltaSource;
pub use periodic::PeriodicSynchronizer;
pub use synchronizer::{RouteSynchronizer, SyncReport};
