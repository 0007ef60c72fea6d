//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::routing::{DEFAULT_CACHE_LIMIT, DEFAULT_SEPARATOR};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Route synchronization settings.
    pub sync: SyncConfig,

    /// Path matcher settings.
    pub matcher: MatcherConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Route definitions served by the file-backed feed.
    pub routes: Vec<RouteDefinition>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Total time allowed for one dispatch.
    pub request_timeout_secs: u64,

    /// Maximum dispatches in flight (backpressure).
    pub max_concurrent_requests: usize,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            max_concurrent_requests: 10_000,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Debounced route synchronization.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Ticker period; change signals are coalesced per period.
    pub period_secs: u64,

    /// Signal a change whenever the config file is modified.
    pub watch_config: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            period_secs: 10,
            watch_config: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Path separator, a single character.
    pub separator: String,

    /// Entries per memo cache before it is cleared.
    pub cache_limit: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR.to_string(),
            cache_limit: DEFAULT_CACHE_LIMIT,
        }
    }
}

impl MatcherConfig {
    /// The separator if it is exactly one character.
    pub fn separator_char(&self) -> Option<char> {
        let mut chars = self.separator.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// A route as declared in the config file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RouteDefinition {
    /// Unique route identifier.
    pub id: String,

    /// Path pattern (Ant-style).
    pub path: String,

    /// Accepted HTTP methods; empty accepts all.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Host header to match (case-insensitive).
    #[serde(default)]
    pub host: Option<String>,

    /// Headers that must be present with these exact values.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Passthrough metadata, never interpreted by the gateway.
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Filters in execution order.
    #[serde(default)]
    pub filters: Vec<FilterDefinition>,
}

/// A filter reference resolved through the filter registry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FilterDefinition {
    pub name: String,

    #[serde(default)]
    pub args: BTreeMap<String, String>,
}
