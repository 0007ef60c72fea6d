//! HTTP dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum fallback, request ID, trace, timeout)
//!     → dispatcher.rs (route resolution, not-found route, error boundary)
//!     → exchange.rs (request/response handles + attribute bag)
//!     → filter.rs (FilterChain over the route's filters)
//!     → response.rs (committed response → HTTP response)
//! ```

pub mod dispatcher;
pub mod exchange;
pub mod filter;
pub mod request;
pub mod response;
pub mod server;

pub use dispatcher::{current_request, ChainState, CompletionHook, Dispatcher, NOT_FOUND_ROUTE_ID};
pub use exchange::{Exchange, ExchangeBuilder};
pub use filter::{Filter, FilterChain};
pub use request::{HttpServerRequest, RequestDecorator, ServerRequest, X_REQUEST_ID};
pub use response::{HttpServerResponse, ResponseDecorator, ServerResponse};
pub use server::GatewayServer;
