use anyhow::Result;
use async_trait::async_trait;

/// Black-box source of matchup estimates.
///
/// Implementations return the provider's raw text; the structured payload is
/// extracted by the caller, so a provider may wrap it in prose or code fences.
#[async_trait]
pub trait EstimateProvider: Send + Sync {
    /// One estimate request for a single matchup.
    async fn request(&self, home_team: &str, away_team: &str) -> Result<String>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
