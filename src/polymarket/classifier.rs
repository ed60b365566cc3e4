//! Market classification and per-event market selection.
//!
//! A game event on Gamma carries dozens of markets: the moneyline, one or more
//! spreads and totals, and a long tail of player props and period markets.
//! Only the game-level moneyline / spread / total are kept, and of each kind
//! only the highest-volume market.

use tracing::debug;

use crate::db::models::{Event, Market, MarketBundle, MarketKind};

/// Player-prop and period-specific phrasing that is never a game-level market.
const EXCLUDED_PHRASES: &[&str] = &[
    "points o/u",
    "rebounds o/u",
    "assists o/u",
    "steals o/u",
    "blocks o/u",
    "turnovers o/u",
    "3-pointer",
    "field goal",
    "free throw",
    "first quarter",
    "second quarter",
    "third quarter",
    "fourth quarter",
    "first half",
    "second half",
    "halftime",
    "triple double",
    "double double",
    "will there be",
    "lead at any",
    "margin of victory",
    "largest lead",
];

const SPREAD_PREFIX: &str = "spread:";
const TOTAL_DELIMITER: &str = ": o/u";

/// Classify a market question. Rules are evaluated in order; the first match wins.
pub fn classify_market(question: &str) -> MarketKind {
    let q = question.trim().to_lowercase();

    if EXCLUDED_PHRASES.iter().any(|p| q.contains(p)) {
        return MarketKind::Excluded;
    }
    if q.starts_with(SPREAD_PREFIX) {
        return MarketKind::Spread;
    }
    if q.contains(TOTAL_DELIMITER) {
        return MarketKind::Total;
    }
    if (q.contains("vs.") || q.contains(" vs ")) && !q.contains(':') {
        return MarketKind::Moneyline;
    }
    MarketKind::Excluded
}

/// Split an event title into `(away, home)`.
/// Titles without a versus separator yield the whole title for both sides.
pub fn split_teams(title: &str) -> (String, String) {
    for sep in [" vs. ", " vs "] {
        if let Some((away, home)) = title.split_once(sep) {
            return (away.trim().to_string(), home.trim().to_string());
        }
    }
    (title.to_string(), title.to_string())
}

/// Keep the highest-volume market of each kind. Returns `None` when the event
/// has no usable market at all.
pub fn build_bundle(event: Event) -> Option<MarketBundle> {
    let mut candidates: Vec<(MarketKind, &Market)> = event
        .markets
        .iter()
        .filter(|m| !m.outcomes.is_empty())
        .map(|m| (classify_market(&m.question), m))
        .filter(|(kind, _)| *kind != MarketKind::Excluded)
        .collect();

    // Stable sort: equal volumes keep encounter order, so the first seen wins.
    candidates.sort_by(|a, b| {
        b.1.volume
            .partial_cmp(&a.1.volume)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut moneyline = None;
    let mut spread = None;
    let mut total = None;
    for (kind, market) in candidates {
        let slot = match kind {
            MarketKind::Moneyline => &mut moneyline,
            MarketKind::Spread => &mut spread,
            MarketKind::Total => &mut total,
            MarketKind::Excluded => continue,
        };
        if slot.is_none() {
            *slot = Some(market.clone());
        }
    }

    if moneyline.is_none() && spread.is_none() && total.is_none() {
        debug!("Event '{}' has no game-level markets", event.title);
        return None;
    }

    Some(MarketBundle {
        event,
        moneyline,
        spread,
        total,
    })
}

/// Build bundles for every event, dropping events with no usable market.
pub fn build_bundles(events: Vec<Event>) -> Vec<MarketBundle> {
    events.into_iter().filter_map(build_bundle).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Outcome;

    fn market(question: &str, volume: f64) -> Market {
        Market {
            question: question.to_string(),
            volume,
            outcomes: vec![
                Outcome { label: "A".into(), token_id: format!("{}-a", question) },
                Outcome { label: "B".into(), token_id: format!("{}-b", question) },
            ],
        }
    }

    fn event(markets: Vec<Market>) -> Event {
        Event {
            id: "e1".into(),
            title: "Knicks vs. Celtics".into(),
            start_time: None,
            volume: 0.0,
            markets,
        }
    }

    #[test]
    fn classifies_game_level_markets() {
        assert_eq!(classify_market("Knicks vs. Celtics"), MarketKind::Moneyline);
        assert_eq!(classify_market("Knicks vs Celtics"), MarketKind::Moneyline);
        assert_eq!(classify_market("Spread: Celtics (-6.5)"), MarketKind::Spread);
        assert_eq!(classify_market("Knicks vs. Celtics: O/U 221.5"), MarketKind::Total);
    }

    #[test]
    fn excludes_props_and_periods() {
        assert_eq!(
            classify_market("Jalen Brunson: Points O/U 27.5"),
            MarketKind::Excluded
        );
        assert_eq!(
            classify_market("Knicks vs. Celtics: First Half Spread"),
            MarketKind::Excluded
        );
        assert_eq!(
            classify_market("Spread: Celtics (-2.5) first quarter"),
            MarketKind::Excluded
        );
        assert_eq!(
            classify_market("Will there be a triple double?"),
            MarketKind::Excluded
        );
    }

    #[test]
    fn versus_with_colon_is_not_moneyline() {
        assert_eq!(
            classify_market("Knicks vs. Celtics: who scores first"),
            MarketKind::Excluded
        );
        assert_eq!(classify_market("Who wins the title?"), MarketKind::Excluded);
    }

    #[test]
    fn split_teams_returns_away_then_home() {
        assert_eq!(
            split_teams("Knicks vs. Celtics"),
            ("Knicks".to_string(), "Celtics".to_string())
        );
        assert_eq!(
            split_teams("Trail Blazers vs Jazz"),
            ("Trail Blazers".to_string(), "Jazz".to_string())
        );
        assert_eq!(
            split_teams("All-Star Game"),
            ("All-Star Game".to_string(), "All-Star Game".to_string())
        );
    }

    #[test]
    fn bundle_keeps_highest_volume_per_kind() {
        let bundle = build_bundle(event(vec![
            market("Spread: Celtics (-6.5)", 100.0),
            market("Spread: Celtics (-4.5)", 900.0),
            market("Knicks vs. Celtics", 5000.0),
            market("Knicks vs. Celtics: O/U 221.5", 300.0),
            market("Jalen Brunson: Points O/U 27.5", 99999.0),
        ]))
        .unwrap();

        assert_eq!(bundle.spread.unwrap().question, "Spread: Celtics (-4.5)");
        assert_eq!(bundle.moneyline.unwrap().question, "Knicks vs. Celtics");
        assert_eq!(bundle.total.unwrap().volume, 300.0);
    }

    #[test]
    fn volume_ties_keep_first_seen() {
        let bundle = build_bundle(event(vec![
            market("Spread: Celtics (-6.5)", 100.0),
            market("Spread: Celtics (-4.5)", 100.0),
        ]))
        .unwrap();
        assert_eq!(bundle.spread.unwrap().question, "Spread: Celtics (-6.5)");
        assert!(bundle.moneyline.is_none());
    }

    #[test]
    fn markets_without_outcomes_are_dropped() {
        let mut broken = market("Knicks vs. Celtics", 1.0);
        broken.outcomes.clear();
        assert!(build_bundle(event(vec![broken])).is_none());
    }

    #[test]
    fn events_without_markets_are_dropped() {
        let bundles = build_bundles(vec![
            event(vec![market("Jalen Brunson: Rebounds O/U 4.5", 10.0)]),
            event(vec![market("Knicks vs. Celtics", 10.0)]),
        ]);
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].markets().count(), 1);
    }
}
