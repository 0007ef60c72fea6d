//! Per-request context shared by the filters of one dispatch.
//!
//! An [`Exchange`] is cheap to clone: clones share the attribute bag, the
//! audit map and the resolved route. [`Exchange::mutate`] produces a new
//! exchange with substituted request or response handles; the original keeps
//! its own handles, so only filters downstream of the substitution see it.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::http::request::ServerRequest;
use crate::http::response::ServerResponse;
use crate::routing::{Route, UriVariables};

#[derive(Debug, Default)]
struct SharedState {
    attributes: RwLock<HashMap<String, Value>>,
    audit: RwLock<Map<String, Value>>,
    route: OnceLock<Arc<Route>>,
    uri_variables: OnceLock<UriVariables>,
}

#[derive(Debug, Clone)]
pub struct Exchange {
    request: Arc<dyn ServerRequest>,
    response: Arc<dyn ServerResponse>,
    shared: Arc<SharedState>,
}

impl Exchange {
    pub fn new(request: Arc<dyn ServerRequest>, response: Arc<dyn ServerResponse>) -> Self {
        Self {
            request,
            response,
            shared: Arc::new(SharedState::default()),
        }
    }

    pub fn request(&self) -> &Arc<dyn ServerRequest> {
        &self.request
    }

    pub fn response(&self) -> &Arc<dyn ServerResponse> {
        &self.response
    }

    /// Read a typed attribute; `None` if absent or of another shape.
    pub fn attribute<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.shared
            .attributes
            .read()
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_attribute<T: Serialize>(&self, key: impl Into<String>, value: &T) {
        match serde_json::to_value(value) {
            Ok(v) => {
                self.shared.attributes.write().insert(key.into(), v);
            }
            Err(e) => {
                tracing::warn!(request_id = %self.request.id(), error = %e, "Attribute not serializable");
            }
        }
    }

    pub fn remove_attribute(&self, key: &str) -> Option<Value> {
        self.shared.attributes.write().remove(key)
    }

    /// Add an entry to the audit map reserved for observability data.
    pub fn record_audit(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.shared.audit.write().insert(key.into(), value.into());
    }

    /// Snapshot of the audit map.
    pub fn audit_log(&self) -> Map<String, Value> {
        self.shared.audit.read().clone()
    }

    /// The route selected for this request, once resolved.
    pub fn route(&self) -> Option<&Arc<Route>> {
        self.shared.route.get()
    }

    /// Template variables extracted from the path by the selected route.
    pub fn uri_variables(&self) -> Option<&UriVariables> {
        self.shared.uri_variables.get()
    }

    pub fn uri_variable(&self, name: &str) -> Option<&str> {
        self.uri_variables()
            .and_then(|vars| vars.get(name))
            .map(String::as_str)
    }

    pub(crate) fn resolve(&self, route: Arc<Route>, variables: UriVariables) {
        if self.shared.route.set(route).is_err() {
            tracing::warn!(request_id = %self.request.id(), "Route already resolved for exchange");
            return;
        }
        let _ = self.shared.uri_variables.set(variables);
    }

    /// Start building an exchange with substituted handles.
    pub fn mutate(&self) -> ExchangeBuilder {
        ExchangeBuilder {
            request: Arc::clone(&self.request),
            response: Arc::clone(&self.response),
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Builder returned by [`Exchange::mutate`].
pub struct ExchangeBuilder {
    request: Arc<dyn ServerRequest>,
    response: Arc<dyn ServerResponse>,
    shared: Arc<SharedState>,
}

impl ExchangeBuilder {
    pub fn request(mut self, request: Arc<dyn ServerRequest>) -> Self {
        self.request = request;
        self
    }

    pub fn response(mut self, response: Arc<dyn ServerResponse>) -> Self {
        self.response = response;
        self
    }

    pub fn build(self) -> Exchange {
        Exchange {
            request: self.request,
            response: self.response,
            shared: self.shared,
        }
    }
}
