//! Filter registry and route construction from definitions.
//!
//! # Data Flow
//! ```text
//! RouteDefinition (config / control plane)
//!     → build_route
//!         → methods parsed (unknown token → error)
//!         → host/header conditions → AndPredicate
//!         → each FilterDefinition → FilterRegistry::create
//!     → Route (ready for RouteTable::add)
//! ```
//!
//! # Design Decisions
//! - The core depends only on the `Filter` trait; how a name becomes a
//!   filter is the registry's business
//! - Unknown filter names fail the whole route, never half-build it

pub mod builtin;

use axum::http::HeaderName;
use std::sync::Arc;

use crate::config::schema::{FilterDefinition, RouteDefinition};
use crate::config::validation::parse_method;
use crate::error::GatewayError;
use crate::http::Filter;
use crate::routing::{AndPredicate, HeaderPredicate, HostPredicate, Route, RoutePredicate};

pub use builtin::{BuiltinFilters, RespondFilter, SetResponseHeaderFilter, StripPrefixFilter};

/// Resolves filter definitions to filter instances.
pub trait FilterRegistry: Send + Sync {
    fn create(&self, definition: &FilterDefinition) -> Result<Arc<dyn Filter>, GatewayError>;
}

/// Convert a route definition into a route.
pub fn build_route(
    definition: &RouteDefinition,
    registry: &dyn FilterRegistry,
) -> Result<Route, GatewayError> {
    let invalid = |reason: String| GatewayError::InvalidRoute {
        id: definition.id.clone(),
        reason,
    };

    let mut methods = Vec::with_capacity(definition.methods.len());
    for token in &definition.methods {
        let method = parse_method(token).ok_or_else(|| invalid(format!("unknown method '{token}'")))?;
        methods.push(method);
    }

    let mut conditions: Vec<Arc<dyn RoutePredicate>> = Vec::new();
    if let Some(host) = &definition.host {
        conditions.push(Arc::new(HostPredicate::new(host.as_str())));
    }
    for (name, value) in &definition.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| invalid(format!("header '{name}': {e}")))?;
        conditions.push(Arc::new(HeaderPredicate::new(name, value.as_str())));
    }

    let mut filters = Vec::with_capacity(definition.filters.len());
    for filter in &definition.filters {
        filters.push(registry.create(filter)?);
    }

    let mut builder = Route::builder(definition.id.as_str(), definition.path.as_str())
        .methods(methods)
        .filters(filters);
    if !conditions.is_empty() {
        builder = builder.predicate(Arc::new(AndPredicate::new(conditions)));
    }
    for (key, value) in &definition.metadata {
        builder = builder.metadata(key.as_str(), value.clone());
    }

    Ok(builder.build())
}
