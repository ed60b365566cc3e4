//! Fair value for moneyline outcomes.
//!
//! Each side gets a raw composite from the external estimate:
//!
//!   raw = 0.55·V + 0.30·N_norm + 0.10·R + F
//!
//! where V is the bookmaker-implied win probability for the side, N_norm the
//! news factor re-centred from −100..100 onto 0..100, R the recent-form score
//! and F a ±5 home-court adjustment. Sides missing star players are then
//! discounted, and in a binary market the two raw values are rescaled so the
//! fair values sum to 100.

use crate::config::ScoringThresholds;
use crate::db::models::{Event, ExternalEstimate, Market, PriceMap, ScoredOutcome, Side};

use super::signal::classify_edge;

const VEGAS_WEIGHT: f64 = 0.55;
const NEWS_WEIGHT: f64 = 0.30;
const FORM_WEIGHT: f64 = 0.10;
/// Home-court adjustment in points (added for home, subtracted for away).
pub const HOME_FIELD_POINTS: f64 = 5.0;

/// Inputs and result of the raw composite for one side
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Composite {
    pub vegas: f64,
    pub news: f64,
    pub news_norm: f64,
    pub form: f64,
    pub home_field: f64,
    pub missing_stars: u32,
    pub penalty: f64,
    /// Post-penalty raw value
    pub raw: f64,
}

/// Multiplier for missing star players. Only exactly three, and four or
/// more, are penalised, at different rates.
pub fn star_penalty(missing_stars: u32) -> f64 {
    match missing_stars {
        3 => 0.90,
        n if n >= 4 => 0.85,
        _ => 1.0,
    }
}

pub fn composite(side: Side, estimate: &ExternalEstimate) -> Composite {
    let (vegas, news, form, missing_stars, home_field) = match side {
        Side::Home => (
            estimate.home_win_prob,
            estimate.home_news,
            estimate.home_form,
            estimate.home_missing_stars,
            HOME_FIELD_POINTS,
        ),
        Side::Away => (
            100.0 - estimate.home_win_prob,
            estimate.away_news,
            estimate.away_form,
            estimate.away_missing_stars,
            -HOME_FIELD_POINTS,
        ),
    };

    let news_norm = (news + 100.0) / 2.0;
    let penalty = star_penalty(missing_stars);
    let raw = (VEGAS_WEIGHT * vegas + NEWS_WEIGHT * news_norm + FORM_WEIGHT * form + home_field)
        * penalty;

    Composite {
        vegas,
        news,
        news_norm,
        form,
        home_field,
        missing_stars,
        penalty,
        raw,
    }
}

/// Rescale two raw values to sum to 100. `None` when the sum is not positive.
pub fn normalize_pair(raw_a: f64, raw_b: f64) -> Option<(f64, f64)> {
    let total = raw_a + raw_b;
    if total > 0.0 {
        Some((raw_a / total * 100.0, raw_b / total * 100.0))
    } else {
        None
    }
}

/// An outcome is the home side iff its label names the home team.
pub fn side_of(label: &str, home_team: &str) -> Side {
    if label.to_lowercase() == home_team.to_lowercase() {
        Side::Home
    } else {
        Side::Away
    }
}

/// Score every priced outcome of a moneyline market.
///
/// Returns the scored outcomes (in market order) and the labels of outcomes
/// that had no price and were skipped.
pub fn score_moneyline(
    event: &Event,
    market: &Market,
    home_team: &str,
    prices: &PriceMap,
    estimate: &ExternalEstimate,
    thresholds: &ScoringThresholds,
) -> (Vec<ScoredOutcome>, Vec<String>) {
    let mut scored = Vec::with_capacity(market.outcomes.len());
    let mut unpriced = Vec::new();

    for outcome in &market.outcomes {
        let Some(price) = prices.get(&outcome.token_id) else {
            unpriced.push(outcome.label.clone());
            continue;
        };
        let price = price * 100.0;
        let side = side_of(&outcome.label, home_team);
        let c = composite(side, estimate);

        scored.push(ScoredOutcome {
            event_title: event.title.clone(),
            start_time: event.start_time,
            outcome: outcome.label.clone(),
            token_id: outcome.token_id.clone(),
            side,
            price,
            vegas: c.vegas,
            news: c.news,
            news_norm: c.news_norm,
            form: c.form,
            home_field: c.home_field,
            missing_stars: c.missing_stars,
            penalty: c.penalty,
            raw: c.raw,
            fair_value: c.raw,
            edge: price - c.raw,
            category: classify_edge(price - c.raw, c.raw, thresholds),
        });
    }

    if let [a, b] = scored.as_mut_slice() {
        if let Some((fair_a, fair_b)) = normalize_pair(a.raw, b.raw) {
            for (o, fair) in [(a, fair_a), (b, fair_b)] {
                o.fair_value = fair;
                o.edge = o.price - fair;
                o.category = classify_edge(o.edge, fair, thresholds);
            }
        }
    }

    (scored, unpriced)
}
