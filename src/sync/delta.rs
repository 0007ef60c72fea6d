//! Units of change from a route feed.

use async_trait::async_trait;

use crate::error::FeedError;
use crate::routing::Route;

/// One add/update/delete instruction.
#[derive(Debug, Clone)]
pub enum RouteDelta {
    /// Add the route, replacing any route with the same id.
    Upsert(Route),
    /// Remove the route with this id.
    Delete(String),
    /// No-op marker (empty poll, keep-alive).
    Heartbeat,
}

impl RouteDelta {
    /// The id this delta applies to; `None` marks a delta to ignore.
    pub fn route_id(&self) -> Option<&str> {
        let id = match self {
            RouteDelta::Upsert(route) => route.id(),
            RouteDelta::Delete(id) => id.as_str(),
            RouteDelta::Heartbeat => return None,
        };
        (!id.is_empty()).then_some(id)
    }
}

/// Pull-based source of route deltas.
///
/// Each call returns the deltas accumulated since the previous call.
#[async_trait]
pub trait DeltaSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RouteDelta>, FeedError>;
}
