//! Route Gateway
//!
//! An HTTP API gateway built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────────┐
//!                        │                     ROUTE GATEWAY                    │
//!                        │                                                      │
//!   Client Request       │  ┌──────────┐   ┌────────────┐   ┌───────────────┐   │
//!   ─────────────────────┼─▶│  http    │──▶│ dispatcher │──▶│  route table  │   │
//!                        │  │  server  │   │            │◀──│  (lookup)     │   │
//!                        │  └──────────┘   └─────┬──────┘   └───────▲───────┘   │
//!                        │                       │                  │           │
//!                        │                       ▼                  │ add/remove│
//!   Client Response      │                ┌────────────┐   ┌────────┴───────┐   │
//!   ◀────────────────────┼────────────────│filter chain│   │  synchronizer  │◀──┼── route feed
//!                        │                └────────────┘   │  (debounced)   │   │   (config file)
//!                        │                                 └────────────────┘   │
//!                        │  config · observability · lifecycle                  │
//!                        └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use route_gateway::config::{load_config, ConfigWatcher};
use route_gateway::filters::BuiltinFilters;
use route_gateway::http::{Dispatcher, GatewayServer};
use route_gateway::lifecycle::Shutdown;
use route_gateway::observability::{logging, metrics};
use route_gateway::routing::{PathMatcher, RouteTable, DEFAULT_SEPARATOR};
use route_gateway::sync::{FileDeltaSource, PeriodicSynchronizer, RouteSynchronizer};

#[derive(Parser, Debug)]
#[command(name = "route-gateway")]
#[command(about = "HTTP API gateway with hot-reloaded routes", long_about = None)]
struct Cli {
    /// Gateway configuration file (TOML).
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "route-gateway starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.listener.request_timeout_secs,
        sync_period_secs = config.sync.period_secs,
        routes = config.routes.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to install metrics exporter");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let separator = config.matcher.separator_char().unwrap_or(DEFAULT_SEPARATOR);
    let table = Arc::new(RouteTable::new(PathMatcher::new(
        separator,
        config.matcher.cache_limit,
    )));

    let shutdown = Arc::new(Shutdown::new());

    // Routes come from the same file, through the synchronizer
    let source = Arc::new(FileDeltaSource::new(&cli.config, Arc::new(BuiltinFilters)));
    let sync = Arc::new(PeriodicSynchronizer::new(
        RouteSynchronizer::new(Arc::clone(&table), source),
        Duration::from_secs(config.sync.period_secs),
    ));
    // Cold start: publish routes before accepting traffic
    sync.signal_change();
    sync.tick().await;
    let sync_task = Arc::clone(&sync).start(shutdown.subscribe());

    let _watcher = if config.sync.watch_config {
        match ConfigWatcher::new(&cli.config, Arc::clone(&sync)).run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "Config watcher unavailable, routes reload on schedule only");
                None
            }
        }
    } else {
        None
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&table)));
    let server = GatewayServer::new(config.listener.clone(), dispatcher);

    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                return;
            }
            tracing::info!("Shutdown signal received");
            shutdown.trigger();
        });
    }

    server.run(listener, shutdown.subscribe()).await?;
    if let Err(e) = sync_task.await {
        tracing::warn!(error = %e, "Route synchronizer task ended abnormally");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
