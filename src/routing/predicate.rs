//! Route predicates.
//!
//! # Responsibilities
//! - Decide whether an exchange is eligible for a route beyond path and method
//! - Host match (case-insensitive, port ignored, URI authority as fallback)
//! - Header value match (exact, case-sensitive value)
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Predicates see the whole exchange, so filters' attributes are visible
//! - Empty AND = always matches
//! - No regex here; path patterns are handled by the path matcher

use axum::http::header::HOST;
use axum::http::HeaderName;
use std::fmt;
use std::sync::Arc;

use crate::http::Exchange;

/// Boolean test of a request context.
pub trait RoutePredicate: Send + Sync + fmt::Debug {
    /// Returns true if the exchange satisfies this condition.
    fn test(&self, exchange: &Exchange) -> bool;
}

/// Matches every exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl RoutePredicate for Always {
    fn test(&self, _exchange: &Exchange) -> bool {
        true
    }
}

/// Matches the request host, ignoring any port.
///
/// The `Host` header wins; without one the URI authority is used, which is
/// where HTTP/2 carries `:authority`.
#[derive(Debug, Clone)]
pub struct HostPredicate {
    expected_host: String,
}

impl HostPredicate {
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }
}

impl RoutePredicate for HostPredicate {
    fn test(&self, exchange: &Exchange) -> bool {
        let request = exchange.request();
        let host = match request.headers().get(HOST) {
            Some(value) => value.to_str().ok().map(strip_port),
            None => request.uri().host(),
        };
        host.map(|h| h.eq_ignore_ascii_case(&self.expected_host))
            .unwrap_or(false)
    }
}

/// `host[:port]` to `host`; bracketed IPv6 literals keep their brackets.
fn strip_port(authority: &str) -> &str {
    if authority.starts_with('[') {
        return match authority.find(']') {
            Some(end) => &authority[..=end],
            None => authority,
        };
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => authority,
    }
}

/// Matches a header with an exact value.
#[derive(Debug, Clone)]
pub struct HeaderPredicate {
    name: HeaderName,
    value: String,
}

impl HeaderPredicate {
    pub fn new(name: HeaderName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

impl RoutePredicate for HeaderPredicate {
    fn test(&self, exchange: &Exchange) -> bool {
        exchange
            .request()
            .headers()
            .get_all(&self.name)
            .iter()
            .any(|v| v.to_str().map(|v| v == self.value).unwrap_or(false))
    }
}

/// Combines multiple predicates with AND semantics.
#[derive(Debug, Default)]
pub struct AndPredicate {
    predicates: Vec<Arc<dyn RoutePredicate>>,
}

impl AndPredicate {
    pub fn new(predicates: Vec<Arc<dyn RoutePredicate>>) -> Self {
        Self { predicates }
    }
}

impl RoutePredicate for AndPredicate {
    fn test(&self, exchange: &Exchange) -> bool {
        self.predicates.iter().all(|p| p.test(exchange))
    }
}

/// Adapter for closures.
pub struct FnPredicate<F> {
    name: &'static str,
    test: F,
}

impl<F> fmt::Debug for FnPredicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPredicate").field("name", &self.name).finish()
    }
}

impl<F> RoutePredicate for FnPredicate<F>
where
    F: Fn(&Exchange) -> bool + Send + Sync,
{
    fn test(&self, exchange: &Exchange) -> bool {
        (self.test)(exchange)
    }
}

/// Wrap a closure as a named predicate.
pub fn from_fn<F>(name: &'static str, test: F) -> Arc<dyn RoutePredicate>
where
    F: Fn(&Exchange) -> bool + Send + Sync + 'static,
{
    Arc::new(FnPredicate { name, test })
}
