//! Filter contract and the forward-only chain that drives it.
//!
//! # Data Flow
//! ```text
//! Dispatcher
//!     → FilterChain::new(route.filters())
//!     → chain.proceed(exchange)
//!         → filter[0].filter(exchange, chain@1)
//!             → either completes the response (short-circuit)
//!             → or chain.proceed(exchange') → filter[1] ...
//!     → past the last filter: Ok(()) (nothing left to do)
//! ```
//!
//! # Design Decisions
//! - `proceed` consumes the chain, so a filter cannot replay or branch it
//! - Filters are opaque trait objects; the core never inspects them

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::http::exchange::Exchange;

/// One step of a route's processing pipeline.
#[async_trait]
pub trait Filter: Send + Sync + fmt::Debug {
    /// Name used in logs and error reports.
    fn name(&self) -> &str;

    /// Complete the response, or hand the exchange to `chain.proceed`.
    async fn filter(&self, exchange: Exchange, chain: FilterChain) -> Result<(), GatewayError>;
}

/// Single-use cursor over a route's filters.
pub struct FilterChain {
    filters: Arc<[Arc<dyn Filter>]>,
    index: usize,
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("len", &self.filters.len())
            .field("index", &self.index)
            .finish()
    }
}

impl FilterChain {
    pub fn new(filters: Arc<[Arc<dyn Filter>]>) -> Self {
        Self { filters, index: 0 }
    }

    /// Run the next filter, or finish if none remain.
    pub async fn proceed(self, exchange: Exchange) -> Result<(), GatewayError> {
        let Some(filter) = self.filters.get(self.index).cloned() else {
            return Ok(());
        };
        let next = FilterChain {
            filters: Arc::clone(&self.filters),
            index: self.index + 1,
        };
        tracing::trace!(
            request_id = %exchange.request().id(),
            filter = %filter.name(),
            position = self.index,
            "Entering filter"
        );
        filter.filter(exchange, next).await
    }

    /// Filters not yet run.
    pub fn remaining(&self) -> usize {
        self.filters.len().saturating_sub(self.index)
    }
}
