//! Route definition.
//!
//! A route is an immutable value once published into the route table. An
//! "update" is an atomic replace by id; see [`RouteTable::add`](super::RouteTable::add).

use axum::http::Method;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::http::Filter;
use crate::routing::predicate::{Always, RoutePredicate};

/// A configured mapping from path pattern + method + predicate to an ordered
/// filter pipeline.
#[derive(Clone)]
pub struct Route {
    id: String,
    path: String,
    methods: HashSet<Method>,
    predicate: Arc<dyn RoutePredicate>,
    filters: Arc<[Arc<dyn Filter>]>,
    metadata: Map<String, Value>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filters: Vec<&str> = self.filters.iter().map(|flt| flt.name()).collect();
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("methods", &self.methods)
            .field("predicate", &self.predicate)
            .field("filters", &filters)
            .finish()
    }
}

impl Route {
    /// Start building a route.
    pub fn builder(id: impl Into<String>, path: impl Into<String>) -> RouteBuilder {
        RouteBuilder {
            id: id.into(),
            path: path.into(),
            methods: HashSet::new(),
            predicate: Arc::new(Always),
            filters: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The path pattern (or literal path) of this route.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn methods(&self) -> &HashSet<Method> {
        &self.methods
    }

    /// An empty method set accepts every method.
    pub fn accepts_method(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    pub fn predicate(&self) -> &Arc<dyn RoutePredicate> {
        &self.predicate
    }

    pub fn filters(&self) -> &Arc<[Arc<dyn Filter>]> {
        &self.filters
    }

    /// Passthrough metadata; never interpreted by the core.
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Copy of this route with its path normalized for `separator`.
    pub(crate) fn normalized(mut self, separator: char) -> Self {
        self.path = normalize_path(&self.path, separator);
        self
    }
}

/// Builder for [`Route`].
pub struct RouteBuilder {
    id: String,
    path: String,
    methods: HashSet<Method>,
    predicate: Arc<dyn RoutePredicate>,
    filters: Vec<Arc<dyn Filter>>,
    metadata: Map<String, Value>,
}

impl RouteBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.methods.insert(method);
        self
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods.extend(methods);
        self
    }

    pub fn predicate(mut self, predicate: Arc<dyn RoutePredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    /// Append a filter; filters run in the order they are added.
    pub fn filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Arc<dyn Filter>>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Route {
        Route {
            id: self.id,
            path: self.path,
            methods: self.methods,
            predicate: self.predicate,
            filters: self.filters.into(),
            metadata: self.metadata,
        }
    }
}

/// Ensure a leading separator and collapse runs of separators.
///
/// A trailing separator is kept: `/a/*` matches `/a/` but not `/a`.
pub fn normalize_path(path: &str, separator: char) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    if !path.starts_with(separator) {
        out.push(separator);
    }
    let mut previous_was_separator = false;
    for c in path.chars() {
        let is_separator = c == separator;
        if !(is_separator && previous_was_separator) {
            out.push(c);
        }
        previous_was_separator = is_separator;
    }
    out
}
