//! HTTP API gateway routing and dispatch core.

pub mod config;
pub mod error;
pub mod filters;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod sync;

pub use config::schema::GatewayConfig;
pub use http::{Dispatcher, GatewayServer};
pub use lifecycle::Shutdown;
pub use routing::{PathMatcher, Route, RouteTable};
pub use sync::{PeriodicSynchronizer, RouteSynchronizer};
