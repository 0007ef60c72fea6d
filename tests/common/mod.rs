//! Shared utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use route_gateway::config::ListenerConfig;
use route_gateway::error::{FeedError, GatewayError};
use route_gateway::http::{Dispatcher, Exchange, Filter, FilterChain, GatewayServer};
use route_gateway::lifecycle::Shutdown;
use route_gateway::routing::RouteTable;
use route_gateway::sync::{DeltaSource, RouteDelta};

/// A gateway serving on an ephemeral local port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub table: Arc<RouteTable>,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a gateway over `table`.
pub async fn spawn_gateway(table: Arc<RouteTable>) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = ListenerConfig::default();
    config.bind_address = addr.to_string();
    config.request_timeout_secs = 5;

    let shutdown = Shutdown::new();
    let server = GatewayServer::new(config, Arc::new(Dispatcher::new(Arc::clone(&table))));
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestGateway {
        addr,
        table,
        shutdown,
    }
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Delta source that serves queued batches and counts fetches.
#[derive(Default)]
pub struct CountingSource {
    fetches: AtomicUsize,
    failing: AtomicBool,
    batches: Mutex<VecDeque<Vec<RouteDelta>>>,
}

impl CountingSource {
    pub fn push(&self, batch: Vec<RouteDelta>) {
        self.batches.lock().push_back(batch);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeltaSource for CountingSource {
    async fn fetch(&self) -> Result<Vec<RouteDelta>, FeedError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(FeedError::Unavailable("control plane unreachable".to_string()));
        }
        Ok(self.batches.lock().pop_front().unwrap_or_default())
    }
}

/// Writes `text`, with `{var}` replaced by the matched URI variables.
#[derive(Debug)]
pub struct TemplateFilter(pub &'static str);

#[async_trait]
impl Filter for TemplateFilter {
    fn name(&self) -> &str {
        "template"
    }

    async fn filter(&self, exchange: Exchange, _chain: FilterChain) -> Result<(), GatewayError> {
        let mut text = self.0.to_string();
        if let Some(vars) = exchange.uri_variables() {
            for (name, value) in vars {
                text = text.replace(&format!("{{{name}}}"), value);
            }
        }
        exchange.response().write(Bytes::from(text))
    }
}

/// Fails with a filter error.
#[derive(Debug)]
pub struct FailingFilter;

#[async_trait]
impl Filter for FailingFilter {
    fn name(&self) -> &str {
        "failing"
    }

    async fn filter(&self, _exchange: Exchange, _chain: FilterChain) -> Result<(), GatewayError> {
        Err(GatewayError::filter("failing", "backend exploded"))
    }
}

/// Panics mid-chain.
#[derive(Debug)]
pub struct PanickingFilter;

#[async_trait]
impl Filter for PanickingFilter {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn filter(&self, _exchange: Exchange, _chain: FilterChain) -> Result<(), GatewayError> {
        panic!("filter bug");
    }
}
