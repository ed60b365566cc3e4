pub mod gemini;
pub mod payload;
pub mod provider;

pub use gemini::GeminiProvider;
pub use payload::{parse_sample, EstimateSample};
pub use provider::EstimateProvider;

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::models::{ExternalEstimate, FieldSpread};
use payload::DEFAULT_SUMMARY;

/// Samples a provider a fixed number of times per matchup and averages the
/// numeric fields.
///
/// Samples for one matchup run strictly one after another; independent
/// matchups may be estimated concurrently by the caller.
#[derive(Clone)]
pub struct EstimateAggregator {
    provider: Arc<dyn EstimateProvider>,
    samples: usize,
    outlier_deviation: f64,
}

impl EstimateAggregator {
    pub fn new(provider: Arc<dyn EstimateProvider>, samples: usize, outlier_deviation: f64) -> Self {
        EstimateAggregator {
            provider,
            samples: samples.max(1),
            outlier_deviation,
        }
    }

    /// Estimate one matchup. `fallback_price` (0.0–1.0, home side) seeds the
    /// default estimate when every sample fails.
    pub async fn estimate(
        &self,
        home_team: &str,
        away_team: &str,
        fallback_price: f64,
    ) -> ExternalEstimate {
        let mut successes = Vec::with_capacity(self.samples);
        for run in 1..=self.samples {
            let text = match self.provider.request(home_team, away_team).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        "{} sample {}/{} for {} @ {} failed: {:#}",
                        self.provider.name(),
                        run,
                        self.samples,
                        away_team,
                        home_team,
                        e
                    );
                    continue;
                }
            };
            match parse_sample(&text) {
                Ok(sample) => successes.push(sample),
                Err(e) => warn!(
                    "{} sample {}/{} for {} @ {} unusable: {}",
                    self.provider.name(),
                    run,
                    self.samples,
                    away_team,
                    home_team,
                    e
                ),
            }
        }

        if successes.is_empty() {
            warn!(
                "No usable estimate for {} @ {}; using price-derived default",
                away_team, home_team
            );
            return default_estimate(fallback_price);
        }

        let estimate = aggregate(&successes, self.outlier_deviation);
        info!(
            "Estimate for {} @ {} from {}/{} sample(s): home={:.1}",
            away_team, home_team, estimate.samples, self.samples, estimate.home_win_prob
        );
        estimate
    }
}

/// Deterministic estimate used when no provider sample succeeded.
pub fn default_estimate(fallback_price: f64) -> ExternalEstimate {
    ExternalEstimate {
        home_win_prob: fallback_price * 100.0,
        home_news: 0.0,
        away_news: 0.0,
        home_form: 50.0,
        away_form: 50.0,
        home_missing_stars: 0,
        away_missing_stars: 0,
        summary: DEFAULT_SUMMARY.to_string(),
        samples: 0,
        spreads: vec![],
    }
}

/// Average successful samples. Outliers are flagged, never removed.
/// `samples` must be non-empty.
pub fn aggregate(samples: &[EstimateSample], outlier_deviation: f64) -> ExternalEstimate {
    let fields: [(&str, fn(&EstimateSample) -> f64); 7] = [
        ("home_win_prob", |s| s.home_win_prob),
        ("home_news", |s| s.home_news),
        ("away_news", |s| s.away_news),
        ("home_form", |s| s.home_form),
        ("away_form", |s| s.away_form),
        ("home_missing_stars", |s| s.home_missing_stars),
        ("away_missing_stars", |s| s.away_missing_stars),
    ];

    let n = samples.len() as f64;
    let spreads: Vec<FieldSpread> = fields
        .iter()
        .map(|(name, get)| {
            let values: Vec<f64> = samples.iter().map(get).collect();
            let mean = values.iter().sum::<f64>() / n;
            let max_deviation = values
                .iter()
                .map(|v| (v - mean).abs())
                .fold(0.0, f64::max);
            FieldSpread {
                field: name.to_string(),
                values,
                mean,
                max_deviation,
                outlier: max_deviation > outlier_deviation,
            }
        })
        .collect();

    for spread in spreads.iter().filter(|s| s.outlier && samples.len() > 1) {
        debug!(
            "Outlier in {}: {:?} (max deviation {:.1})",
            spread.field, spread.values, spread.max_deviation
        );
    }

    let mean = |i: usize| spreads[i].mean;
    ExternalEstimate {
        home_win_prob: mean(0),
        home_news: mean(1),
        away_news: mean(2),
        home_form: mean(3),
        away_form: mean(4),
        home_missing_stars: round_count(mean(5)),
        away_missing_stars: round_count(mean(6)),
        // The summary is prose; the most recent one is kept rather than averaged.
        summary: samples
            .last()
            .map(|s| s.summary.clone())
            .unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
        samples: samples.len(),
        spreads: if samples.len() > 1 { spreads } else { vec![] },
    }
}

/// Nearest integer, ties to even, floored at zero.
fn round_count(mean: f64) -> u32 {
    mean.round_ties_even().max(0.0) as u32
}
