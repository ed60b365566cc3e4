//! Bounded-concurrency midpoint resolution.
//!
//! Every token is looked up exactly once. Failures of any kind (transport,
//! status, timeout, missing or out-of-range midpoint) leave the token out of
//! the returned map; nothing is retried and nothing propagates.

use futures_util::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::provider::MarketDataProvider;
use crate::db::models::PriceMap;
use crate::error::ScanError;

#[derive(Clone)]
pub struct PriceResolver {
    provider: Arc<dyn MarketDataProvider>,
    max_in_flight: usize,
    lookup_timeout: Duration,
}

impl PriceResolver {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        max_in_flight: usize,
        lookup_timeout: Duration,
    ) -> Self {
        PriceResolver {
            provider,
            max_in_flight: max_in_flight.max(1),
            lookup_timeout,
        }
    }

    /// Resolve midpoints for `token_ids`, deduplicating first. Blocks until
    /// every lookup has completed or failed.
    pub async fn resolve<I, S>(&self, token_ids: I) -> PriceMap
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let unique: BTreeSet<String> = token_ids.into_iter().map(Into::into).collect();
        let requested = unique.len();

        let prices: PriceMap = stream::iter(unique)
            .map(|token_id| async move {
                let price = self.lookup(&token_id).await;
                (token_id, price)
            })
            .buffer_unordered(self.max_in_flight)
            .filter_map(|(token_id, price)| async move { price.map(|p| (token_id, p)) })
            .collect()
            .await;

        info!("Resolved {}/{} midpoint(s)", prices.len(), requested);
        prices
    }

    async fn lookup(&self, token_id: &str) -> Option<f64> {
        let result: anyhow::Result<()> = match tokio::time::timeout(
            self.lookup_timeout,
            self.provider.lookup_midpoint(token_id),
        )
        .await
        {
            Ok(Ok(Some(mid))) if (0.0..=1.0).contains(&mid) => return Some(mid),
            Ok(Ok(Some(mid))) => Err(ScanError::PriceOutOfRange(mid).into()),
            Ok(Ok(None)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(anyhow::Error::from(ScanError::Timeout(self.lookup_timeout))),
        };
        match result {
            Ok(()) => debug!("No midpoint for token {}", token_id),
            Err(e) => debug!("Midpoint lookup failed for token {}: {:#}", token_id, e),
        }
        None
    }
}
