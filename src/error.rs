//! Error types shared across the gateway core.

use thiserror::Error;

/// Errors raised while compiling or evaluating a path pattern.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatternError {
    /// A `{name:regex}` segment carried a regex that does not compile.
    #[error("invalid regex in pattern segment '{segment}': {reason}")]
    InvalidRegex { segment: String, reason: String },

    /// The compiled segment exposes a different number of capture groups than
    /// the template variables it declares (capturing groups inside an inline regex).
    #[error(
        "pattern segment '{segment}' declares {declared} variable(s) but compiles to {groups} capturing group(s); use non-capturing groups"
    )]
    CaptureMismatch {
        segment: String,
        declared: usize,
        groups: usize,
    },

    /// `extract_variables` was called with a path the pattern does not match.
    #[error("pattern '{pattern}' is not a match for '{path}'")]
    Unmatched { pattern: String, path: String },
}

/// Errors raised by route table mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("route id must not be empty")]
    EmptyId,

    #[error("route '{id}' has an invalid path pattern: {source}")]
    InvalidPattern {
        id: String,
        #[source]
        source: PatternError,
    },
}

/// Errors raised by an external route-delta feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("feed payload could not be decoded: {0}")]
    Decode(String),

    #[error("feed unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by filters and the dispatch pipeline.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The response was already committed when a filter tried to write it again.
    #[error("response already committed")]
    ResponseCommitted,

    /// The request body was already consumed by an upstream filter.
    #[error("request body already consumed")]
    BodyConsumed,

    /// A filter produced a request view that is not a valid HTTP request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("filter '{filter}' failed: {reason}")]
    Filter { filter: String, reason: String },

    /// A route definition could not be turned into a route.
    #[error("route '{id}' is invalid: {reason}")]
    InvalidRoute { id: String, reason: String },

    #[error("filter '{0}' is not registered")]
    UnknownFilter(String),

    #[error("invalid argument '{arg}' for filter '{filter}': {reason}")]
    InvalidFilterArgs {
        filter: String,
        arg: String,
        reason: String,
    },

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("filter chain panicked: {0}")]
    Panic(String),
}

impl GatewayError {
    /// Convenience constructor for filter implementations.
    pub fn filter(filter: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        GatewayError::Filter {
            filter: filter.into(),
            reason: reason.to_string(),
        }
    }
}
