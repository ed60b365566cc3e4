use std::cmp::Ordering;

use crate::config::ScoringThresholds;
use crate::db::models::{Category, MatchupCall, Opportunity, ScoredOutcome};

use super::signal::price_quality;

fn category_rank(category: Category) -> u8 {
    match category {
        Category::Scalp => 0,
        Category::Buy => 1,
        Category::Avoid => 2,
        Category::Fair => 3,
    }
}

/// Actionable outcomes grouped Scalp, Buy, Avoid; each group by |edge| desc.
pub fn rank_opportunities<'a, I>(outcomes: I) -> Vec<Opportunity>
where
    I: IntoIterator<Item = &'a ScoredOutcome>,
{
    let mut ranked: Vec<Opportunity> = outcomes
        .into_iter()
        .filter_map(|o| {
            o.category.action().map(|action| Opportunity {
                outcome: o.clone(),
                action: action.to_string(),
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        category_rank(a.outcome.category)
            .cmp(&category_rank(b.outcome.category))
            .then_with(|| b.outcome.edge.abs().total_cmp(&a.outcome.edge.abs()))
    });
    ranked
}

/// Likely-winner call for a binary event when the fair-value gap is large enough.
pub fn matchup_call(outcomes: &[ScoredOutcome], thresholds: &ScoringThresholds) -> Option<MatchupCall> {
    let [a, b] = outcomes else {
        return None;
    };
    let (favorite, underdog) = match a.fair_value.partial_cmp(&b.fair_value) {
        Some(Ordering::Greater) => (a, b),
        _ => (b, a),
    };
    let gap = favorite.fair_value - underdog.fair_value;
    if gap < thresholds.gap_min {
        return None;
    }

    Some(MatchupCall {
        event_title: favorite.event_title.clone(),
        start_time: favorite.start_time,
        favorite: favorite.clone(),
        underdog: underdog.clone(),
        gap,
        price_quality: price_quality(favorite.edge),
    })
}

/// Largest gap first
pub fn rank_matchups(mut calls: Vec<MatchupCall>) -> Vec<MatchupCall> {
    calls.sort_by(|a, b| b.gap.total_cmp(&a.gap));
    calls
}
