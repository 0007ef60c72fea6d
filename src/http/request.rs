//! Request handles.
//!
//! # Responsibilities
//! - Carry the inbound request through the filter chain as an abstract handle
//! - Assign a request ID as early as possible (header wins, else UUID v4)
//! - Let a filter substitute a decorated request for downstream filters only
//!
//! # Design Decisions
//! - The body can be taken exactly once; later takers get `BodyConsumed`
//! - A decorator never mutates its delegate; upstream filters keep their view

use axum::body::Body;
use axum::http::{uri::PathAndQuery, HeaderMap, HeaderName, HeaderValue, Method, Request, Uri};
use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::GatewayError;

/// Header name for request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Read-only view of an inbound request.
pub trait ServerRequest: Send + Sync + fmt::Debug {
    /// Correlation id of this request.
    fn id(&self) -> &str;

    fn method(&self) -> &Method;

    fn uri(&self) -> &Uri;

    /// Request path without the query string.
    fn path(&self) -> &str {
        self.uri().path()
    }

    fn headers(&self) -> &HeaderMap;

    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Take ownership of the body stream.
    fn take_body(&self) -> Result<Body, GatewayError>;
}

/// Request handle backed by a transport-level `http::Request`.
pub struct HttpServerRequest {
    id: String,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    body: Mutex<Option<Body>>,
}

impl HttpServerRequest {
    pub fn from_http(request: Request<Body>, remote_addr: Option<SocketAddr>) -> Self {
        let (parts, body) = request.into_parts();
        let id = parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            id,
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            remote_addr,
            body: Mutex::new(Some(body)),
        }
    }
}

impl fmt::Debug for HttpServerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpServerRequest")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}

impl ServerRequest for HttpServerRequest {
    fn id(&self) -> &str {
        &self.id
    }

    fn method(&self) -> &Method {
        &self.method
    }

    fn uri(&self) -> &Uri {
        &self.uri
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    fn take_body(&self) -> Result<Body, GatewayError> {
        self.body.lock().take().ok_or(GatewayError::BodyConsumed)
    }
}

/// A request view layered over another request.
///
/// Anything not overridden is read from the delegate, including the body.
#[derive(Debug)]
pub struct RequestDecorator {
    delegate: Arc<dyn ServerRequest>,
    method: Option<Method>,
    uri: Option<Uri>,
    headers: Option<HeaderMap>,
}

impl RequestDecorator {
    pub fn new(delegate: Arc<dyn ServerRequest>) -> Self {
        Self {
            delegate,
            method: None,
            uri: None,
            headers: None,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_uri(mut self, uri: Uri) -> Self {
        self.uri = Some(uri);
        self
    }

    /// Replace the path, keeping the query string of the current view.
    pub fn with_path(self, path: &str) -> Result<Self, GatewayError> {
        let current = self.uri.clone().unwrap_or_else(|| self.delegate.uri().clone());
        let path_and_query = match current.query() {
            Some(query) => format!("{path}?{query}"),
            None => path.to_string(),
        };
        let path_and_query = PathAndQuery::try_from(path_and_query)
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

        let mut parts = current.into_parts();
        parts.path_and_query = Some(path_and_query);
        let uri = Uri::from_parts(parts).map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
        Ok(self.with_uri(uri))
    }

    /// Set a header on this view; the delegate's headers are untouched.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        let headers = self
            .headers
            .get_or_insert_with(|| self.delegate.headers().clone());
        headers.insert(name, value);
        self
    }
}

impl ServerRequest for RequestDecorator {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn method(&self) -> &Method {
        self.method.as_ref().unwrap_or_else(|| self.delegate.method())
    }

    fn uri(&self) -> &Uri {
        self.uri.as_ref().unwrap_or_else(|| self.delegate.uri())
    }

    fn headers(&self) -> &HeaderMap {
        self.headers.as_ref().unwrap_or_else(|| self.delegate.headers())
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.delegate.remote_addr()
    }

    fn take_body(&self) -> Result<Body, GatewayError> {
        self.delegate.take_body()
    }
}
