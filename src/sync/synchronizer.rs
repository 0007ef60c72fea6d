//! Manual-trigger route synchronization.

use std::sync::Arc;

use crate::error::FeedError;
use crate::observability::metrics;
use crate::routing::RouteTable;
use crate::sync::delta::{DeltaSource, RouteDelta};

/// Outcome of one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub upserted: usize,
    pub removed: usize,
    /// Heartbeats, blank ids and deletes of ids the table does not hold.
    pub ignored: usize,
    /// Upserts refused by the table (invalid pattern).
    pub rejected: usize,
}

/// Pulls deltas from a source and applies them to a route table.
pub struct RouteSynchronizer {
    table: Arc<RouteTable>,
    source: Arc<dyn DeltaSource>,
}

impl RouteSynchronizer {
    pub fn new(table: Arc<RouteTable>, source: Arc<dyn DeltaSource>) -> Self {
        Self { table, source }
    }

    pub fn table(&self) -> &Arc<RouteTable> {
        &self.table
    }

    /// Pull everything the source has and apply it.
    ///
    /// On a fetch error the table is left untouched.
    pub async fn request_update(&self) -> Result<SyncReport, FeedError> {
        let deltas = match self.source.fetch().await {
            Ok(deltas) => deltas,
            Err(e) => {
                metrics::record_sync_pass("feed_error");
                return Err(e);
            }
        };

        let report = self.apply(deltas);
        metrics::record_sync_pass("applied");
        tracing::info!(
            upserted = report.upserted,
            removed = report.removed,
            ignored = report.ignored,
            rejected = report.rejected,
            routes = self.table.len(),
            "Route synchronization pass applied"
        );
        Ok(report)
    }

    /// Apply a batch of deltas in order.
    pub fn apply(&self, deltas: impl IntoIterator<Item = RouteDelta>) -> SyncReport {
        let mut report = SyncReport::default();

        for delta in deltas {
            if delta.route_id().is_none() {
                report.ignored += 1;
                continue;
            }
            match delta {
                RouteDelta::Upsert(route) => {
                    let id = route.id().to_string();
                    match self.table.add(route) {
                        Ok(_) => report.upserted += 1,
                        Err(e) => {
                            tracing::error!(route_id = %id, error = %e, "Rejected route from feed");
                            report.rejected += 1;
                        }
                    }
                }
                RouteDelta::Delete(id) => match self.table.remove_by_id(&id) {
                    Some(_) => report.removed += 1,
                    None => {
                        tracing::debug!(route_id = %id, "Delete for unknown route");
                        report.ignored += 1;
                    }
                },
                RouteDelta::Heartbeat => report.ignored += 1,
            }
        }

        report
    }
}
