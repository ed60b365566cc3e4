use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::{stream, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ScanSettings;
use crate::db::models::{
    EventReport, ExternalEstimate, MarketBundle, PriceMap, Report, ScoredOutcome, Side,
};
use crate::estimate::{EstimateAggregator, EstimateProvider};
use crate::polymarket::{build_bundles, split_teams, MarketDataProvider, PriceResolver};

use super::fair_value::{score_moneyline, side_of};
use super::ranker::{matchup_call, rank_matchups, rank_opportunities};
use super::report::{self, emit, LineSink};

/// Price used to seed the default estimate when no external sample succeeds
const NEUTRAL_PRICE: f64 = 0.5;

/// One end-to-end scan: list, classify, price, estimate, score, rank.
pub struct Scanner {
    market_data: Arc<dyn MarketDataProvider>,
    prices: PriceResolver,
    estimates: EstimateAggregator,
    settings: ScanSettings,
}

impl Scanner {
    pub fn new(
        market_data: Arc<dyn MarketDataProvider>,
        estimate_provider: Arc<dyn EstimateProvider>,
        settings: ScanSettings,
    ) -> Self {
        let prices = PriceResolver::new(
            market_data.clone(),
            settings.price_workers,
            settings.price_timeout,
        );
        let estimates = EstimateAggregator::new(
            estimate_provider,
            settings.estimate_samples,
            settings.outlier_deviation,
        );
        Scanner {
            market_data,
            prices,
            estimates,
            settings,
        }
    }

    /// Run the scan, streaming report lines to `lines` as they are produced.
    ///
    /// Only a failed event listing aborts the run; price and estimate
    /// failures degrade individual events.
    pub async fn run(&self, lines: &LineSink) -> Result<Report> {
        let date = self.settings.date;
        let thresholds = self.settings.thresholds;
        emit(lines, report::header_lines(date, &thresholds));

        emit(lines, ["[1/4] Loading events...".to_string()]);
        let events = self
            .market_data
            .list_events_for_date(date)
            .await
            .with_context(|| format!("Failed to list events for {}", date))?;
        let events_listed = events.len();
        if events.is_empty() {
            info!("No events listed for {}", date);
            emit(lines, ["  No games today.".to_string()]);
        } else {
            emit(lines, [format!("  {} event(s) found", events_listed)]);
        }

        let bundles = build_bundles(events);
        info!("{} of {} event(s) have usable markets", bundles.len(), events_listed);
        emit(lines, [format!("  {} event(s) with usable markets", bundles.len())]);

        emit(lines, [String::new(), "[2/4] Fetching prices...".to_string()]);
        let tokens: Vec<&str> = bundles
            .iter()
            .flat_map(|b| b.markets())
            .flat_map(|m| m.outcomes.iter())
            .map(|o| o.token_id.as_str())
            .collect();
        let prices = self.prices.resolve(tokens.iter().copied()).await;
        let tokens_requested = prices_requested(&tokens);
        emit(
            lines,
            [format!("  {}/{} prices resolved", prices.len(), tokens_requested)],
        );

        emit(
            lines,
            [
                String::new(),
                format!(
                    "[3/4] Estimating {} matchup(s) ({} sample(s) each)...",
                    bundles.len(),
                    self.settings.estimate_samples
                ),
            ],
        );
        let estimates = self.estimate_all(&bundles, &prices, lines).await;

        emit(lines, [String::new(), "[4/4] Scoring...".to_string()]);
        let mut events = Vec::with_capacity(bundles.len());
        let mut matchup_calls = Vec::new();
        for (bundle, estimate) in bundles.iter().zip(estimates) {
            let event = self.score_event(bundle, &prices, estimate);
            emit(lines, report::event_lines(&event));
            if let Some(call) = matchup_call(&event.outcomes, &thresholds) {
                matchup_calls.push(call);
            }
            events.push(event);
        }

        let scored: Vec<&ScoredOutcome> = events.iter().flat_map(|e| e.outcomes.iter()).collect();
        let opportunities = rank_opportunities(scored);
        let matchup_calls = rank_matchups(matchup_calls);
        emit(
            lines,
            report::summary_lines(&opportunities, &matchup_calls, &thresholds),
        );

        info!(
            "Scan for {} complete: {} event(s), {} opportunit(ies), {} matchup call(s)",
            date,
            events.len(),
            opportunities.len(),
            matchup_calls.len()
        );

        Ok(Report {
            date,
            generated_at: Utc::now(),
            events_listed,
            tokens_requested,
            prices_resolved: prices.len(),
            events,
            opportunities,
            matchup_calls,
        })
    }

    /// Estimates for every bundle, in bundle order. Matchups overlap up to
    /// `estimate_concurrency`; each matchup's samples stay sequential.
    async fn estimate_all(
        &self,
        bundles: &[MarketBundle],
        prices: &PriceMap,
        lines: &LineSink,
    ) -> Vec<ExternalEstimate> {
        // Owned jobs keep the buffered futures free of borrows into `bundles`.
        let jobs: Vec<(String, String, String, f64)> = bundles
            .iter()
            .map(|bundle| {
                let (away, home) = split_teams(&bundle.event.title);
                let fallback = home_price(bundle, &home, prices).unwrap_or(NEUTRAL_PRICE);
                (bundle.event.title.clone(), home, away, fallback)
            })
            .collect();

        let mut ordered = stream::iter(jobs)
            .map(|(title, home, away, fallback)| {
                let aggregator = self.estimates.clone();
                async move {
                    let estimate = aggregator.estimate(&home, &away, fallback).await;
                    (title, estimate)
                }
            })
            .buffered(self.settings.estimate_concurrency.max(1));

        let mut estimates = Vec::with_capacity(bundles.len());
        while let Some((title, estimate)) = ordered.next().await {
            emit(lines, report::estimate_lines(&title, &estimate));
            estimates.push(estimate);
        }
        estimates
    }

    fn score_event(
        &self,
        bundle: &MarketBundle,
        prices: &PriceMap,
        estimate: ExternalEstimate,
    ) -> EventReport {
        let (away_team, home_team) = split_teams(&bundle.event.title);
        let (outcomes, unpriced) = match &bundle.moneyline {
            Some(market) => score_moneyline(
                &bundle.event,
                market,
                &home_team,
                prices,
                &estimate,
                &self.settings.thresholds,
            ),
            None => (vec![], vec![]),
        };
        if !unpriced.is_empty() {
            warn!(
                "{}: no price for {}",
                bundle.event.title,
                unpriced.join(", ")
            );
        }

        EventReport {
            title: bundle.event.title.clone(),
            start_time: bundle.event.start_time,
            volume: bundle.event.volume,
            home_team,
            away_team,
            estimate,
            has_moneyline: bundle.moneyline.is_some(),
            outcomes,
            unpriced,
            references: report::reference_quotes(bundle, prices),
        }
    }
}

/// Traded price of the home side of the moneyline, if resolved
fn home_price(bundle: &MarketBundle, home_team: &str, prices: &PriceMap) -> Option<f64> {
    bundle
        .moneyline
        .as_ref()?
        .outcomes
        .iter()
        .find(|o| side_of(&o.label, home_team) == Side::Home)
        .and_then(|o| prices.get(&o.token_id).copied())
}

fn prices_requested(tokens: &[&str]) -> usize {
    tokens
        .iter()
        .collect::<std::collections::BTreeSet<_>>()
        .len()
}
