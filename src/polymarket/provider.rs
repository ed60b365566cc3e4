use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::db::models::Event;

/// Source of scheduled events and traded midpoints.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// All events scheduled on `date`, with their raw markets.
    /// Any transport or status failure is fatal for the run.
    async fn list_events_for_date(&self, date: NaiveDate) -> Result<Vec<Event>>;

    /// Current midpoint (0.0–1.0) for an outcome token, `None` when the
    /// book has no midpoint.
    async fn lookup_midpoint(&self, token_id: &str) -> Result<Option<f64>>;
}
