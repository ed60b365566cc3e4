//! Text rendering of a scan. Every function returns owned lines so the
//! scanner can forward them to stdout or the dashboard unchanged.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::mpsc;

use crate::config::ScoringThresholds;
use crate::db::models::{
    Category, EventReport, ExternalEstimate, Market, MarketBundle, MarketKind, MatchupCall,
    Opportunity, PriceMap, ReferenceQuote, ScoredOutcome, Side,
};

/// Receiver end is stdout in CLI mode and the broadcast buffer in dashboard mode.
pub type LineSink = mpsc::UnboundedSender<String>;

const WIDTH: usize = 68;
const BAR_WIDTH: usize = 20;

/// Forward lines to the sink. A dropped receiver only loses output.
pub fn emit(sink: &LineSink, lines: impl IntoIterator<Item = String>) {
    for line in lines {
        if sink.send(line).is_err() {
            return;
        }
    }
}

fn rule(c: char) -> String {
    c.to_string().repeat(WIDTH)
}

/// Start time shown in US Eastern (fixed UTC−5 offset)
pub fn start_label(start: Option<DateTime<Utc>>) -> String {
    match start {
        Some(t) => (t - Duration::hours(5)).format("%I:%M %p ET").to_string(),
        None => "TBD".to_string(),
    }
}

/// Horizontal bar for a 0–100 value
pub fn bar(value: f64) -> String {
    let ratio = (value / 100.0).clamp(0.0, 1.0);
    let filled = (ratio * BAR_WIDTH as f64) as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

pub fn header_lines(date: NaiveDate, thresholds: &ScoringThresholds) -> Vec<String> {
    vec![
        rule('═'),
        "  SPORTS EDGE SCANNER: pre-game opportunity report".to_string(),
        rule('═'),
        format!("  Date      : {}", date),
        format!(
            "  Scalp     : edge ≤ -{:.0} and fair ≥ {:.0}",
            thresholds.scalp_min, thresholds.scalp_floor
        ),
        format!("  Buy/Avoid : |edge| ≥ {:.0}", thresholds.nea_min),
        format!("  Matchup   : fair-value gap ≥ {:.0}", thresholds.gap_min),
        String::new(),
    ]
}

/// Per-field sample breakdown followed by the averaged values
pub fn estimate_lines(title: &str, estimate: &ExternalEstimate) -> Vec<String> {
    let mut lines = vec![format!("  {}  ({} sample(s) averaged)", title, estimate.samples)];
    for spread in &estimate.spreads {
        let values: Vec<String> = spread.values.iter().map(|v| format!("{:.0}", v)).collect();
        lines.push(format!(
            "      {:<18}: [{}] → avg {:.1}{}",
            spread.field,
            values.join(" | "),
            spread.mean,
            if spread.outlier {
                format!("  (high variance, max dev {:.1})", spread.max_deviation)
            } else {
                String::new()
            }
        ));
    }
    if estimate.samples == 0 {
        lines.push("      no usable sample; estimate derived from market price".to_string());
    }
    lines.push(format!(
        "      FINAL → Vegas={:.1}  news {:+.0}/{:+.0}  form {:.0}/{:.0}  stars out {}/{}",
        estimate.home_win_prob,
        estimate.home_news,
        estimate.away_news,
        estimate.home_form,
        estimate.away_form,
        estimate.home_missing_stars,
        estimate.away_missing_stars,
    ));
    lines
}

fn outcome_lines(o: &ScoredOutcome) -> Vec<String> {
    let role = match o.side {
        Side::Home => "home",
        Side::Away => "away",
    };
    let mut lines = vec![
        String::new(),
        format!("  {} ({})", o.outcome.to_uppercase(), role),
        format!("     Price    : {:5.1}  {}", o.price, bar(o.price)),
        format!("     Vegas    : {:5.1}  {}", o.vegas, bar(o.vegas)),
        format!("     News     : {:+5.1}  (norm {:.1})", o.news, o.news_norm),
        format!("     Home     : {:+5.1}", o.home_field),
        format!("     Form     : {:5.1}  {}", o.form, bar(o.form)),
    ];
    if o.missing_stars > 0 {
        let penalty = if o.penalty < 1.0 {
            format!("  (×{:.2})", o.penalty)
        } else {
            String::new()
        };
        lines.push(format!("     Stars out: {}{}", o.missing_stars, penalty));
    }
    lines.push(format!("     {}", "─".repeat(50)));
    lines.push(format!("     Fair     : {:.1}", o.fair_value));
    lines.push(format!(
        "     Edge = {:.1} - {:.1} = {:+.1}",
        o.price, o.fair_value, o.edge
    ));
    lines.push(format!("     {}: {}", o.category.as_str(), o.category.describe(o.edge)));
    lines
}

/// Full diagnostic block for one event
pub fn event_lines(event: &EventReport) -> Vec<String> {
    let mut lines = vec![
        String::new(),
        rule('═'),
        format!("  {}", event.title.to_uppercase()),
        format!(
            "  {}   |   Vol ${:.0}",
            start_label(event.start_time),
            event.volume
        ),
        rule('═'),
        format!("  {}", event.estimate.summary),
        rule('─'),
    ];

    if !event.has_moneyline {
        lines.push("  No moneyline market available".to_string());
    } else if event.outcomes.is_empty() {
        lines.push("  No prices available".to_string());
    }
    for label in &event.unpriced {
        lines.push(format!("  Price unavailable for: {}", label));
    }
    for outcome in &event.outcomes {
        lines.extend(outcome_lines(outcome));
    }

    if !event.references.is_empty() {
        lines.push(String::new());
        lines.push(format!("  {}", "─".repeat(WIDTH - 2)));
        for quote in &event.references {
            let kind = match quote.kind {
                MarketKind::Spread => "SPREAD",
                _ => "TOTAL",
            };
            let price = quote
                .price
                .map(|p| format!("{:.0}¢", p))
                .unwrap_or_else(|| "-".to_string());
            lines.push(format!("  {:<7} {:<24} → {}", kind, quote.label, price));
        }
    }
    lines
}

/// Spread and total rows for an event, in market outcome order
pub fn reference_quotes(bundle: &MarketBundle, prices: &PriceMap) -> Vec<ReferenceQuote> {
    let mut quotes = Vec::new();
    if let Some(spread) = &bundle.spread {
        quotes.extend(market_quotes(spread, MarketKind::Spread, prices));
    }
    if let Some(total) = &bundle.total {
        quotes.extend(market_quotes(total, MarketKind::Total, prices));
    }
    quotes
}

fn market_quotes(market: &Market, kind: MarketKind, prices: &PriceMap) -> Vec<ReferenceQuote> {
    market
        .outcomes
        .iter()
        .map(|o| ReferenceQuote {
            kind,
            label: match kind {
                MarketKind::Spread => spread_label(&market.question, &o.label),
                _ => total_label(&market.question, &o.label),
            },
            price: prices.get(&o.token_id).map(|p| (p * 100.0).round()),
        })
        .collect()
}

/// "Spread: Celtics (-6.5)" gives "Celtics -6.5" and "Knicks +6.5".
fn spread_label(question: &str, outcome: &str) -> String {
    let parsed = question.split_once(':').and_then(|(_, rest)| {
        let (team, points) = rest.split_once('(')?;
        let points: f64 = points.trim().trim_end_matches(')').trim().parse().ok()?;
        Some((team.trim().to_string(), points))
    });
    match parsed {
        Some((team, points)) if team.eq_ignore_ascii_case(outcome) => {
            format!("{} {:+.1}", outcome, points)
        }
        Some((_, points)) => format!("{} {:+.1}", outcome, -points),
        None => outcome.to_string(),
    }
}

/// "Knicks vs. Celtics: O/U 221.5" gives "O 221.5" / "U 221.5".
fn total_label(question: &str, outcome: &str) -> String {
    let line = question
        .to_ascii_lowercase()
        .find("o/u")
        .map(|i| question[i + 3..].trim().to_string())
        .filter(|l| !l.is_empty());
    match line {
        Some(line) => {
            let prefix = if outcome.eq_ignore_ascii_case("over") { "O" } else { "U" };
            format!("{} {}", prefix, line)
        }
        None => outcome.to_string(),
    }
}

fn opportunity_section(
    title: String,
    opportunities: &[Opportunity],
    category: Category,
) -> Vec<String> {
    let mut lines = vec![String::new(), title, format!("  {}", "─".repeat(WIDTH - 2))];
    let mut any = false;
    for op in opportunities.iter().filter(|o| o.outcome.category == category) {
        let o = &op.outcome;
        any = true;
        lines.push(format!(
            "  ✔  {:<22} Price {:5.1} → Fair {:5.1}  Edge {:+6.1}  |  {}",
            o.outcome,
            o.price,
            o.fair_value,
            o.edge,
            start_label(o.start_time)
        ));
        lines.push(format!("     {}  [{}]", o.event_title, op.action));
    }
    if !any {
        lines.push("  -  none today".to_string());
    }
    lines
}

fn matchup_lines(call: &MatchupCall) -> Vec<String> {
    let (fav, dog) = (&call.favorite, &call.underdog);
    vec![
        String::new(),
        format!("  ▶  {}  |  {}", call.event_title, start_label(call.start_time)),
        format!("     Fair-value gap: {:.1}", call.gap),
        format!(
            "     Favourite {:<20} Fair {:5.1}  Price {:5.1}  Edge {:+6.1}  ← {}",
            fav.outcome,
            fav.fair_value,
            fav.price,
            fav.edge,
            call.price_quality.label()
        ),
        format!(
            "     Underdog  {:<20} Fair {:5.1}  Price {:5.1}  Edge {:+6.1}",
            dog.outcome, dog.fair_value, dog.price, dog.edge
        ),
    ]
}

/// Final ranked summary. Inputs are expected already ranked.
pub fn summary_lines(
    opportunities: &[Opportunity],
    matchup_calls: &[MatchupCall],
    thresholds: &ScoringThresholds,
) -> Vec<String> {
    let mut lines = vec![
        String::new(),
        String::new(),
        rule('═'),
        "  SUMMARY".to_string(),
        rule('═'),
    ];
    lines.extend(opportunity_section(
        format!(
            "  SCALP  (edge ≤ -{:.0} and fair ≥ {:.0})",
            thresholds.scalp_min, thresholds.scalp_floor
        ),
        opportunities,
        Category::Scalp,
    ));
    lines.extend(opportunity_section(
        format!("  BUY  (edge ≤ -{:.0})", thresholds.nea_min),
        opportunities,
        Category::Buy,
    ));
    lines.extend(opportunity_section(
        format!("  AVOID  (edge ≥ +{:.0})", thresholds.nea_min),
        opportunities,
        Category::Avoid,
    ));

    lines.push(String::new());
    lines.push(format!(
        "  LIKELY WINNERS  (fair-value gap ≥ {:.0})",
        thresholds.gap_min
    ));
    lines.push(format!("  {}", "─".repeat(WIDTH - 2)));
    if matchup_calls.is_empty() {
        lines.push(format!(
            "  -  no matchup with a gap ≥ {:.0} today",
            thresholds.gap_min
        ));
    }
    for call in matchup_calls {
        lines.extend(matchup_lines(call));
    }

    lines.push(String::new());
    lines.push(rule('═'));
    lines.push("  Informational only. Not financial advice.".to_string());
    lines.push(rule('═'));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Event, Outcome};
    use chrono::TimeZone;

    fn market(question: &str, outcomes: &[(&str, &str)]) -> Market {
        Market {
            question: question.into(),
            volume: 0.0,
            outcomes: outcomes
                .iter()
                .map(|(l, t)| Outcome { label: l.to_string(), token_id: t.to_string() })
                .collect(),
        }
    }

    #[test]
    fn start_time_rendered_in_eastern() {
        let t = Utc.with_ymd_and_hms(2026, 1, 15, 0, 30, 0).unwrap();
        assert_eq!(start_label(Some(t)), "07:30 PM ET");
        assert_eq!(start_label(None), "TBD");
    }

    #[test]
    fn bar_is_clamped() {
        assert_eq!(bar(50.0).chars().filter(|c| *c == '█').count(), 10);
        assert_eq!(bar(150.0).chars().filter(|c| *c == '█').count(), 20);
        assert_eq!(bar(-5.0).chars().filter(|c| *c == '░').count(), 20);
    }

    #[test]
    fn spread_points_are_signed_per_side() {
        let q = "Spread: Celtics (-6.5)";
        assert_eq!(spread_label(q, "Celtics"), "Celtics -6.5");
        assert_eq!(spread_label(q, "Knicks"), "Knicks +6.5");
        assert_eq!(spread_label("Spread Celtics", "Celtics"), "Celtics");
    }

    #[test]
    fn total_line_is_extracted() {
        let q = "Knicks vs. Celtics: O/U 221.5";
        assert_eq!(total_label(q, "Over"), "O 221.5");
        assert_eq!(total_label(q, "Under"), "U 221.5");
        assert_eq!(total_label("Points total", "Over"), "Over");
    }

    #[test]
    fn reference_quotes_carry_cents() {
        let bundle = MarketBundle {
            event: Event {
                id: "1".into(),
                title: "Knicks vs. Celtics".into(),
                start_time: None,
                volume: 0.0,
                markets: vec![],
            },
            moneyline: None,
            spread: Some(market(
                "Spread: Celtics (-6.5)",
                &[("Celtics", "s1"), ("Knicks", "s2")],
            )),
            total: Some(market(
                "Knicks vs. Celtics: O/U 221.5",
                &[("Over", "t1"), ("Under", "t2")],
            )),
        };
        let prices = PriceMap::from([
            ("s1".to_string(), 0.52),
            ("t1".to_string(), 0.48),
            ("t2".to_string(), 0.52),
        ]);
        let quotes = reference_quotes(&bundle, &prices);
        assert_eq!(quotes.len(), 4);
        assert_eq!(quotes[0].price, Some(52.0));
        assert_eq!(quotes[1].price, None);
        assert_eq!(quotes[2].label, "O 221.5");
        assert_eq!(quotes[3].kind, MarketKind::Total);
    }

    #[test]
    fn empty_summary_says_none() {
        let lines = summary_lines(&[], &[], &ScoringThresholds::default());
        assert_eq!(lines.iter().filter(|l| l.contains("none today")).count(), 3);
        assert!(lines.iter().any(|l| l.contains("no matchup with a gap ≥ 15")));
    }

    #[test]
    fn emit_survives_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        emit(&tx, vec!["a".to_string(), "b".to_string()]);
    }
}
