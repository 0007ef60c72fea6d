//! Per-request dispatch.
//!
//! # Responsibilities
//! - Resolve the route for a request (path, method, predicate)
//! - Substitute the synthetic not-found route when nothing matches
//! - Run the route's filter chain inside a request-scoped context
//! - Turn any filter error or panic into a 500
//! - Finalize every dispatch exactly once (completed, failed or cancelled)
//!
//! # Data Flow
//! ```text
//! handle(request, response)
//!     → Exchange::new
//!     → RouteTable::lookup(path)
//!         → first route with matching method && predicate(exchange)
//!         → else NOT_FOUND route (single filter → 404)
//!         → panic → Failed, response reset to 500
//!     → CURRENT_REQUEST.scope(chain.proceed(exchange)).catch_unwind()
//!         → Ok(Ok)       → Completed, response untouched
//!         → Ok(Err) / panic → Failed, response reset to 500
//!         → future dropped  → Cancelled (ChainTracker::drop)
//! ```
//!
//! # Design Decisions
//! - "No match" is a regular route, so nothing downstream special-cases it
//! - Cancellation is observed through drop, the same path every outcome
//!   takes through `ChainTracker`

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use futures_util::FutureExt;
use std::any::Any;
use std::fmt;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use crate::error::GatewayError;
use crate::http::exchange::Exchange;
use crate::http::filter::{Filter, FilterChain};
use crate::http::request::{HttpServerRequest, ServerRequest};
use crate::http::response::{HttpServerResponse, ServerResponse};
use crate::observability::metrics;
use crate::routing::{Route, RouteTable, UriVariables};

/// Id of the synthetic route used when no configured route matches.
pub const NOT_FOUND_ROUTE_ID: &str = "__not_found__";

/// Route id recorded when route resolution itself panics.
pub const UNRESOLVED_ROUTE_ID: &str = "__unresolved__";

tokio::task_local! {
    static CURRENT_REQUEST: Arc<dyn ServerRequest>;
}

/// The request being dispatched by the current task, if any.
pub fn current_request() -> Option<Arc<dyn ServerRequest>> {
    CURRENT_REQUEST.try_with(Arc::clone).ok()
}

/// Lifecycle of one filter chain execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ChainState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainState::Pending => "pending",
            ChainState::Running => "running",
            ChainState::Completed => "completed",
            ChainState::Failed => "failed",
            ChainState::Cancelled => "cancelled",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChainState::Completed | ChainState::Failed | ChainState::Cancelled
        )
    }
}

/// Called once per dispatch with the route id and terminal state.
pub type CompletionHook = Arc<dyn Fn(&str, ChainState) + Send + Sync>;

#[derive(Debug)]
struct NotFoundFilter;

#[async_trait]
impl Filter for NotFoundFilter {
    fn name(&self) -> &str {
        "not-found"
    }

    async fn filter(&self, exchange: Exchange, _chain: FilterChain) -> Result<(), GatewayError> {
        let response = exchange.response();
        response.set_status(StatusCode::NOT_FOUND)?;
        response.write(Bytes::from_static(b"Not Found"))
    }
}

/// Finalizes a dispatch exactly once, including when the future is dropped.
struct ChainTracker {
    request_id: String,
    route_id: String,
    start: Instant,
    response: Arc<dyn ServerResponse>,
    hook: Option<CompletionHook>,
    state: ChainState,
}

impl ChainTracker {
    fn new(
        request_id: &str,
        route_id: &str,
        response: Arc<dyn ServerResponse>,
        hook: Option<CompletionHook>,
    ) -> Self {
        Self {
            request_id: request_id.to_string(),
            route_id: route_id.to_string(),
            start: Instant::now(),
            response,
            hook,
            state: ChainState::Pending,
        }
    }

    fn start(&mut self) {
        self.state = ChainState::Running;
    }

    fn finish(&mut self, state: ChainState) {
        if self.state.is_terminal() {
            return;
        }
        self.state = state;

        let status = match state {
            ChainState::Cancelled => 499,
            _ => self.response.status().as_u16(),
        };
        metrics::record_request(&self.route_id, status, self.start);
        metrics::record_dispatch_outcome(state.as_str());

        tracing::debug!(
            request_id = %self.request_id,
            route_id = %self.route_id,
            status,
            outcome = state.as_str(),
            elapsed_ms = self.start.elapsed().as_millis() as u64,
            "Dispatch finished"
        );

        if let Some(hook) = &self.hook {
            hook(&self.route_id, state);
        }
    }

    /// Replace the response with a 500 and finalize as failed.
    fn fail(&mut self, request: &dyn ServerRequest, error: &GatewayError) {
        tracing::error!(
            request_id = %self.request_id,
            route_id = %self.route_id,
            method = %request.method(),
            path = %request.path(),
            error = %error,
            "Dispatch failed"
        );
        self.response.reset(
            StatusCode::INTERNAL_SERVER_ERROR,
            Bytes::from_static(b"Internal Server Error"),
        );
        self.finish(ChainState::Failed);
    }
}

impl Drop for ChainTracker {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            tracing::info!(
                request_id = %self.request_id,
                route_id = %self.route_id,
                "Dispatch cancelled"
            );
            self.finish(ChainState::Cancelled);
        }
    }
}

/// Dispatch entry point wired to the transport's per-request callback.
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    not_found: Arc<Route>,
    hook: Option<CompletionHook>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes.len())
            .finish()
    }
}

impl Dispatcher {
    pub fn new(routes: Arc<RouteTable>) -> Self {
        let not_found = Route::builder(NOT_FOUND_ROUTE_ID, "/**")
            .filter(Arc::new(NotFoundFilter))
            .build();
        Self {
            routes,
            not_found: Arc::new(not_found),
            hook: None,
        }
    }

    /// Observe the terminal state of every dispatch.
    pub fn on_complete(mut self, hook: CompletionHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    /// Select the route for an exchange and record it on the exchange.
    pub fn resolve(&self, exchange: &Exchange) -> Arc<Route> {
        let request = exchange.request();
        let path = request.path();

        let selected = self
            .routes
            .lookup(path)
            .find(|route| route.accepts_method(request.method()) && route.predicate().test(exchange));

        match selected {
            Some(route) => {
                let variables = self.routes.uri_variables(&route, path);
                exchange.resolve(Arc::clone(&route), variables);
                route
            }
            None => {
                tracing::debug!(
                    request_id = %request.id(),
                    method = %request.method(),
                    path = %path,
                    "No route matched"
                );
                exchange.resolve(Arc::clone(&self.not_found), UriVariables::new());
                Arc::clone(&self.not_found)
            }
        }
    }

    /// Run the matched route's filters against `request`, writing `response`.
    ///
    /// Never fails: errors and panics in resolution or in the chain become a 500.
    pub async fn handle(&self, request: Arc<dyn ServerRequest>, response: Arc<dyn ServerResponse>) {
        let exchange = Exchange::new(Arc::clone(&request), Arc::clone(&response));
        exchange.record_audit("request_id", request.id());

        let route = match std::panic::catch_unwind(AssertUnwindSafe(|| self.resolve(&exchange))) {
            Ok(route) => route,
            Err(panic) => {
                let mut tracker = ChainTracker::new(
                    request.id(),
                    UNRESOLVED_ROUTE_ID,
                    Arc::clone(&response),
                    self.hook.clone(),
                );
                tracker.start();
                tracker.fail(&*request, &GatewayError::Panic(panic_message(&*panic)));
                return;
            }
        };
        exchange.record_audit("route_id", route.id());

        let mut tracker = ChainTracker::new(
            request.id(),
            route.id(),
            Arc::clone(&response),
            self.hook.clone(),
        );
        tracker.start();

        let chain = FilterChain::new(Arc::clone(route.filters()));
        let outcome = CURRENT_REQUEST
            .scope(
                Arc::clone(&request),
                AssertUnwindSafe(chain.proceed(exchange)).catch_unwind(),
            )
            .await;

        match outcome {
            Ok(Ok(())) => tracker.finish(ChainState::Completed),
            Ok(Err(e)) => tracker.fail(&*request, &e),
            Err(panic) => tracker.fail(&*request, &GatewayError::Panic(panic_message(&*panic))),
        }
    }

    /// Adapter from a transport-level request to a transport-level response.
    pub async fn handle_http(&self, request: Request<Body>, remote_addr: Option<SocketAddr>) -> Response {
        let request: Arc<dyn ServerRequest> = Arc::new(HttpServerRequest::from_http(request, remote_addr));
        let response = Arc::new(HttpServerResponse::new());
        self.handle(request, response.clone()).await;
        response.take_response()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::ResponseDecorator;
    use crate::routing::predicate::from_fn;
    use axum::http::{HeaderName, HeaderValue, Method};
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Debug)]
    struct Respond(&'static str);

    #[async_trait]
    impl Filter for Respond {
        fn name(&self) -> &str {
            "respond"
        }

        async fn filter(&self, exchange: Exchange, _chain: FilterChain) -> Result<(), GatewayError> {
            exchange.response().write(Bytes::from_static(self.0.as_bytes()))
        }
    }

    #[derive(Debug)]
    struct Fail;

    #[async_trait]
    impl Filter for Fail {
        fn name(&self) -> &str {
            "fail"
        }

        async fn filter(&self, _exchange: Exchange, _chain: FilterChain) -> Result<(), GatewayError> {
            Err(GatewayError::filter("fail", "upstream unavailable"))
        }
    }

    #[derive(Debug)]
    struct Hang;

    #[async_trait]
    impl Filter for Hang {
        fn name(&self) -> &str {
            "hang"
        }

        async fn filter(&self, _exchange: Exchange, _chain: FilterChain) -> Result<(), GatewayError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[derive(Debug)]
    struct CaptureCurrent;

    #[async_trait]
    impl Filter for CaptureCurrent {
        fn name(&self) -> &str {
            "capture-current"
        }

        async fn filter(&self, exchange: Exchange, _chain: FilterChain) -> Result<(), GatewayError> {
            let current = current_request().map(|r| r.id().to_string()).unwrap_or_default();
            exchange.response().write(Bytes::from(current))
        }
    }

    fn request(method: Method, path: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(path)
            .header("x-request-id", "req-42")
            .body(Body::empty())
            .unwrap()
    }

    async fn body(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn unmatched_request_gets_404() {
        let dispatcher = Dispatcher::new(Arc::new(RouteTable::default()));
        let response = dispatcher.handle_http(request(Method::GET, "/nothing"), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn method_and_predicate_filter_candidates() {
        let table = Arc::new(RouteTable::default());
        table
            .add(
                Route::builder("post-only", "/items/{id}")
                    .method(Method::POST)
                    .filter(Arc::new(Respond("post")))
                    .build(),
            )
            .unwrap();
        table
            .add(
                Route::builder("never", "/items/**")
                    .predicate(from_fn("never", |_| false))
                    .filter(Arc::new(Respond("never")))
                    .build(),
            )
            .unwrap();
        table
            .add(
                Route::builder("any", "/items/*")
                    .filter(Arc::new(Respond("any")))
                    .build(),
            )
            .unwrap();

        let dispatcher = Dispatcher::new(table);
        let post = dispatcher.handle_http(request(Method::POST, "/items/1"), None).await;
        assert_eq!(body(post).await, "post");
        let get = dispatcher.handle_http(request(Method::GET, "/items/1"), None).await;
        assert_eq!(body(get).await, "any");
    }

    #[tokio::test]
    async fn resolve_records_route_and_variables() {
        let table = Arc::new(RouteTable::default());
        table.add(Route::builder("orders", "/orders/{id}").build()).unwrap();
        let dispatcher = Dispatcher::new(table);

        let exchange = Exchange::new(
            Arc::new(HttpServerRequest::from_http(request(Method::GET, "/orders/9"), None)),
            Arc::new(HttpServerResponse::new()),
        );
        let route = dispatcher.resolve(&exchange);
        assert_eq!(route.id(), "orders");
        assert_eq!(exchange.uri_variable("id"), Some("9"));
    }

    #[tokio::test]
    async fn filter_error_and_panic_become_500() {
        let table = Arc::new(RouteTable::default());
        table
            .add(Route::builder("fails", "/fail").filter(Arc::new(Fail)).build())
            .unwrap();
        table
            .add(
                Route::builder("panics", "/panic")
                    .filter(Arc::new(FnPanic))
                    .build(),
            )
            .unwrap();

        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outcomes);
        let dispatcher = Dispatcher::new(table).on_complete(Arc::new(move |route: &str, state: ChainState| {
            sink.lock().push((route.to_string(), state));
        }));

        let failed = dispatcher.handle_http(request(Method::GET, "/fail"), None).await;
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let panicked = dispatcher.handle_http(request(Method::GET, "/panic"), None).await;
        assert_eq!(panicked.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            *outcomes.lock(),
            vec![
                ("fails".to_string(), ChainState::Failed),
                ("panics".to_string(), ChainState::Failed),
            ]
        );
    }

    #[derive(Debug)]
    struct FnPanic;

    #[async_trait]
    impl Filter for FnPanic {
        fn name(&self) -> &str {
            "panic"
        }

        async fn filter(&self, _exchange: Exchange, _chain: FilterChain) -> Result<(), GatewayError> {
            panic!("filter bug");
        }
    }

    #[tokio::test]
    async fn panicking_predicate_becomes_500() {
        let table = Arc::new(RouteTable::default());
        table
            .add(
                Route::builder("boom", "/boom")
                    .predicate(from_fn("boom", |_| panic!("predicate bug")))
                    .filter(Arc::new(Respond("unreachable")))
                    .build(),
            )
            .unwrap();

        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outcomes);
        let dispatcher = Arc::new(Dispatcher::new(table).on_complete(Arc::new(move |route: &str, state: ChainState| {
            sink.lock().push((route.to_string(), state));
        })));

        let task = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.handle_http(request(Method::GET, "/boom"), None).await })
        };
        let response = task.await.expect("dispatch must not unwind into the transport");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(response).await, "Internal Server Error");
        assert_eq!(
            *outcomes.lock(),
            vec![(UNRESOLVED_ROUTE_ID.to_string(), ChainState::Failed)]
        );
    }

    #[tokio::test]
    async fn failure_resets_a_decorated_response() {
        let table = Arc::new(RouteTable::default());
        table
            .add(Route::builder("fails", "/fail").filter(Arc::new(Fail)).build())
            .unwrap();
        let dispatcher = Dispatcher::new(table);

        let inner = Arc::new(HttpServerResponse::new());
        let decorated: Arc<dyn ServerResponse> = Arc::new(
            ResponseDecorator::new(inner.clone())
                .with_header(HeaderName::from_static("x-edge"), HeaderValue::from_static("1")),
        );
        let request: Arc<dyn ServerRequest> =
            Arc::new(HttpServerRequest::from_http(request(Method::GET, "/fail"), None));

        dispatcher.handle(request, decorated).await;

        let response = inner.take_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get("x-edge").is_none());
        assert_eq!(body(response).await, "Internal Server Error");
    }

    #[tokio::test]
    async fn current_request_is_visible_inside_chain() {
        let table = Arc::new(RouteTable::default());
        table
            .add(Route::builder("who", "/who").filter(Arc::new(CaptureCurrent)).build())
            .unwrap();
        let dispatcher = Dispatcher::new(table);

        let response = dispatcher.handle_http(request(Method::GET, "/who"), None).await;
        assert_eq!(body(response).await, "req-42");
        assert!(current_request().is_none());
    }

    #[tokio::test]
    async fn dropped_dispatch_is_finalized_as_cancelled() {
        let table = Arc::new(RouteTable::default());
        table
            .add(Route::builder("slow", "/slow").filter(Arc::new(Hang)).build())
            .unwrap();

        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outcomes);
        let dispatcher = Arc::new(Dispatcher::new(table).on_complete(Arc::new(move |route: &str, state: ChainState| {
            sink.lock().push((route.to_string(), state));
        })));

        let task = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.handle_http(request(Method::GET, "/slow"), None).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.abort();
        let _ = task.await;

        assert_eq!(
            *outcomes.lock(),
            vec![("slow".to_string(), ChainState::Cancelled)]
        );
    }

    #[test]
    fn panic_messages() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*boxed), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*boxed), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*boxed), "unknown panic");
    }
}
