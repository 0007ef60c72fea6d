//! Debounced periodic synchronization.
//!
//! # Responsibilities
//! - Accept change signals from any thread at any rate
//! - Coalesce them into at most one reconciliation pass per tick
//! - Force a full pull on the first tick after start
//!
//! # Design Decisions
//! - The signal is a single atomic flag, not a queue
//! - Ticks never overlap: the pass runs inline in the ticker loop
//! - A failed pass re-arms the flag so the next tick retries

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::sync::synchronizer::{RouteSynchronizer, SyncReport};

pub struct PeriodicSynchronizer {
    inner: RouteSynchronizer,
    period: Duration,
    dirty: AtomicBool,
}

impl PeriodicSynchronizer {
    pub const DEFAULT_PERIOD: Duration = Duration::from_secs(10);

    pub fn new(inner: RouteSynchronizer, period: Duration) -> Self {
        Self {
            inner,
            period,
            dirty: AtomicBool::new(false),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn synchronizer(&self) -> &RouteSynchronizer {
        &self.inner
    }

    /// Mark the feed as changed; the next tick pulls it.
    pub fn signal_change(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Run one pass if a change was signalled since the last one.
    pub async fn tick(&self) -> Option<SyncReport> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return None;
        }

        match self.inner.request_update().await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(error = %e, "Route feed fetch failed, retrying next tick");
                self.dirty.store(true, Ordering::Release);
                None
            }
        }
    }

    /// Spawn the ticker loop; it exits when `shutdown` fires.
    pub fn start(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        self.signal_change();

        tokio::spawn(async move {
            tracing::info!(period_secs = self.period.as_secs(), "Route synchronizer starting");

            let mut ticker = time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Route synchronizer received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }
}
