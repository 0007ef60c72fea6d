//! Response handles.
//!
//! # Responsibilities
//! - Collect status, headers and body written by filters
//! - Commit exactly once; late writers get `ResponseCommitted`
//! - Let a filter substitute a decorated response for downstream filters
//!
//! # Design Decisions
//! - Bodies are whole `Bytes` values; filters that stream own their transport
//! - `reset` is the only way past a commit; the dispatcher uses it on the
//!   error path

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::error::GatewayError;

/// Writable view of the outbound response.
pub trait ServerResponse: Send + Sync + fmt::Debug {
    fn status(&self) -> StatusCode;

    fn set_status(&self, status: StatusCode) -> Result<(), GatewayError>;

    /// Snapshot of the headers set so far.
    fn headers(&self) -> HeaderMap;

    fn insert_header(&self, name: HeaderName, value: HeaderValue) -> Result<(), GatewayError>;

    /// Write the body and commit the response.
    fn write(&self, body: Bytes) -> Result<(), GatewayError>;

    fn is_committed(&self) -> bool;

    /// Discard whatever was written and commit `status` with `body`.
    fn reset(&self, status: StatusCode, body: Bytes);
}

#[derive(Debug)]
struct ResponseState {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    committed: bool,
}

/// The transport-facing response the dispatcher turns into an HTTP response.
#[derive(Debug)]
pub struct HttpServerResponse {
    state: Mutex<ResponseState>,
}

impl Default for HttpServerResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpServerResponse {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ResponseState {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::new(),
                committed: false,
            }),
        }
    }

    /// Build the HTTP response, leaving an empty committed handle behind.
    pub fn take_response(&self) -> Response {
        let mut state = self.state.lock();
        state.committed = true;
        let mut response = Response::new(Body::from(std::mem::take(&mut state.body)));
        *response.status_mut() = state.status;
        *response.headers_mut() = std::mem::take(&mut state.headers);
        response
    }
}

impl ServerResponse for HttpServerResponse {
    fn status(&self) -> StatusCode {
        self.state.lock().status
    }

    fn set_status(&self, status: StatusCode) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        if state.committed {
            return Err(GatewayError::ResponseCommitted);
        }
        state.status = status;
        Ok(())
    }

    fn headers(&self) -> HeaderMap {
        self.state.lock().headers.clone()
    }

    fn insert_header(&self, name: HeaderName, value: HeaderValue) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        if state.committed {
            return Err(GatewayError::ResponseCommitted);
        }
        state.headers.insert(name, value);
        Ok(())
    }

    fn write(&self, body: Bytes) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        if state.committed {
            return Err(GatewayError::ResponseCommitted);
        }
        state.body = body;
        state.committed = true;
        Ok(())
    }

    fn is_committed(&self) -> bool {
        self.state.lock().committed
    }

    fn reset(&self, status: StatusCode, body: Bytes) {
        let mut state = self.state.lock();
        state.status = status;
        state.headers.clear();
        state.body = body;
        state.committed = true;
    }
}

type BodyMapper = Arc<dyn Fn(Bytes) -> Bytes + Send + Sync>;

/// A response view layered over another response.
///
/// Headers added here are applied to the delegate when the response is
/// written, overriding values set by downstream filters.
pub struct ResponseDecorator {
    delegate: Arc<dyn ServerResponse>,
    headers: HeaderMap,
    body_mapper: Option<BodyMapper>,
}

impl fmt::Debug for ResponseDecorator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseDecorator")
            .field("delegate", &self.delegate)
            .field("headers", &self.headers)
            .field("maps_body", &self.body_mapper.is_some())
            .finish()
    }
}

impl ResponseDecorator {
    pub fn new(delegate: Arc<dyn ServerResponse>) -> Self {
        Self {
            delegate,
            headers: HeaderMap::new(),
            body_mapper: None,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Transform the body on its way to the delegate.
    pub fn map_body<F>(mut self, mapper: F) -> Self
    where
        F: Fn(Bytes) -> Bytes + Send + Sync + 'static,
    {
        self.body_mapper = Some(Arc::new(mapper));
        self
    }

    /// Push the pending headers to the delegate if it is still open.
    pub fn flush_headers(&self) -> Result<(), GatewayError> {
        for (name, value) in &self.headers {
            self.delegate.insert_header(name.clone(), value.clone())?;
        }
        Ok(())
    }
}

impl ServerResponse for ResponseDecorator {
    fn status(&self) -> StatusCode {
        self.delegate.status()
    }

    fn set_status(&self, status: StatusCode) -> Result<(), GatewayError> {
        self.delegate.set_status(status)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = self.delegate.headers();
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }
        headers
    }

    fn insert_header(&self, name: HeaderName, value: HeaderValue) -> Result<(), GatewayError> {
        self.delegate.insert_header(name, value)
    }

    fn write(&self, body: Bytes) -> Result<(), GatewayError> {
        self.flush_headers()?;
        let body = match &self.body_mapper {
            Some(mapper) => mapper(body),
            None => body,
        };
        self.delegate.write(body)
    }

    fn is_committed(&self) -> bool {
        self.delegate.is_committed()
    }

    // pending headers and the body mapper do not apply to a reset
    fn reset(&self, status: StatusCode, body: Bytes) {
        self.delegate.reset(status, body);
    }
}
