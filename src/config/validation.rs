//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (period > 0, cache limit > 0)
//! - Check route ids, paths, patterns and methods
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use axum::http::Method;
use std::collections::HashSet;
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::error::PatternError;
use crate::routing::PathMatcher;

const KNOWN_METHODS: [Method; 9] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::CONNECT,
    Method::OPTIONS,
    Method::TRACE,
    Method::PATCH,
];

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("sync.period_secs must be greater than zero")]
    ZeroSyncPeriod,

    #[error("matcher.cache_limit must be greater than zero")]
    ZeroCacheLimit,

    #[error("matcher.separator must be a single character, got '{0}'")]
    InvalidSeparator(String),

    #[error("listener.request_timeout_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("route #{index} has an empty id")]
    EmptyRouteId { index: usize },

    #[error("route id '{0}' is declared more than once")]
    DuplicateRouteId(String),

    #[error("route '{id}' path '{path}' must start with '{separator}'")]
    RelativePath {
        id: String,
        path: String,
        separator: char,
    },

    #[error("route '{id}' has an invalid pattern: {source}")]
    InvalidPattern {
        id: String,
        #[source]
        source: PatternError,
    },

    #[error("route '{id}' has unknown method '{method}'")]
    UnknownMethod { id: String, method: String },
}

/// Parse a configured method token (case-insensitive).
pub fn parse_method(token: &str) -> Option<Method> {
    let upper = token.to_ascii_uppercase();
    KNOWN_METHODS.into_iter().find(|m| m.as_str() == upper)
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.sync.period_secs == 0 {
        errors.push(ValidationError::ZeroSyncPeriod);
    }
    if config.matcher.cache_limit == 0 {
        errors.push(ValidationError::ZeroCacheLimit);
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    let separator = match config.matcher.separator_char() {
        Some(c) => c,
        None => {
            errors.push(ValidationError::InvalidSeparator(config.matcher.separator.clone()));
            crate::routing::DEFAULT_SEPARATOR
        }
    };
    let matcher = PathMatcher::new(separator, config.matcher.cache_limit.max(1));

    let mut seen = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        if route.id.is_empty() {
            errors.push(ValidationError::EmptyRouteId { index });
        } else if !seen.insert(route.id.as_str()) {
            errors.push(ValidationError::DuplicateRouteId(route.id.clone()));
        }

        if !route.path.starts_with(separator) {
            errors.push(ValidationError::RelativePath {
                id: route.id.clone(),
                path: route.path.clone(),
                separator,
            });
        }
        if let Err(source) = matcher.validate(&route.path) {
            errors.push(ValidationError::InvalidPattern {
                id: route.id.clone(),
                source,
            });
        }

        for method in &route.methods {
            if parse_method(method).is_none() {
                errors.push(ValidationError::UnknownMethod {
                    id: route.id.clone(),
                    method: method.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
