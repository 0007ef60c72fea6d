//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path, method, headers)
//!     → table.rs (normalize path, candidate groups: literal, then prefixes)
//!     → matcher.rs (Ant-style pattern evaluation, segment.rs per token)
//!     → predicate.rs (host/header/custom conditions, evaluated by dispatcher)
//!     → Return: ordered candidate routes
//!
//! Route Publication (at runtime, single writer):
//!     Route
//!     → normalize path, compile pattern (fail fast on bad regex)
//!     → replace any route with the same id
//!     → join literal group or constant-prefix group
//! ```
//!
//! # Design Decisions
//! - Routes are immutable once published; updates are atomic replaces by id
//! - Token and segment compilation are memoized with a bounded, reset-on-full cache
//! - Deterministic: insertion order within a group, literal before pattern

pub mod cache;
pub mod matcher;
pub mod predicate;
pub mod route;
pub mod segment;
pub mod table;

pub use matcher::{PathMatcher, UriVariables, DEFAULT_CACHE_LIMIT, DEFAULT_SEPARATOR};
pub use predicate::{AndPredicate, HeaderPredicate, HostPredicate, RoutePredicate};
pub use route::{normalize_path, Route, RouteBuilder};
pub use table::{Lookup, RouteTable};
