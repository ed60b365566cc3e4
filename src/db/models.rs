use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// token_id → midpoint price (0.0–1.0). A missing key means "price unavailable".
pub type PriceMap = HashMap<String, f64>;

/// One scheduled game as listed by the Gamma events API
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    /// "<away> vs. <home>"
    pub title: String,
    pub start_time: Option<DateTime<Utc>>,
    /// Aggregate traded volume in USD
    pub volume: f64,
    pub markets: Vec<Market>,
}

/// One tradable question within an event
#[derive(Debug, Clone, PartialEq)]
pub struct Market {
    pub question: String,
    pub volume: f64,
    /// Outcome labels paired with their CLOB token IDs, in provider order.
    /// Empty when the provider arrays were malformed or of unequal length.
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub label: String,
    pub token_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketKind {
    Moneyline,
    Spread,
    Total,
    Excluded,
}

/// An event with at most one retained market per kind.
#[derive(Debug, Clone)]
pub struct MarketBundle {
    pub event: Event,
    pub moneyline: Option<Market>,
    pub spread: Option<Market>,
    pub total: Option<Market>,
}

impl MarketBundle {
    pub fn markets(&self) -> impl Iterator<Item = &Market> {
        [&self.moneyline, &self.spread, &self.total]
            .into_iter()
            .flatten()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Home,
    Away,
}

/// Per-matchup estimate averaged across provider samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEstimate {
    /// Implied home win probability from bookmaker odds (0–100)
    pub home_win_prob: f64,
    /// Injury / availability signal (−100–100)
    pub home_news: f64,
    pub away_news: f64,
    /// Recent-results strength (0–100)
    pub home_form: f64,
    pub away_form: f64,
    /// Star players ruled out (0–5)
    pub home_missing_stars: u32,
    pub away_missing_stars: u32,
    pub summary: String,
    /// Successful samples behind the averages; 0 for the fallback default.
    pub samples: usize,
    /// Per-field sample breakdown, only populated when `samples > 1`.
    pub spreads: Vec<FieldSpread>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpread {
    pub field: String,
    pub values: Vec<f64>,
    pub mean: f64,
    pub max_deviation: f64,
    pub outlier: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Scalp,
    Buy,
    Avoid,
    Fair,
}

/// Moneyline outcome after scoring. All values are on the 0–100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredOutcome {
    pub event_title: String,
    pub start_time: Option<DateTime<Utc>>,
    pub outcome: String,
    pub token_id: String,
    pub side: Side,
    /// Traded price
    pub price: f64,
    pub vegas: f64,
    pub news: f64,
    pub news_norm: f64,
    pub form: f64,
    pub home_field: f64,
    pub missing_stars: u32,
    /// Multiplier applied to the raw composite (1.0, 0.90 or 0.85)
    pub penalty: f64,
    /// Post-penalty composite value
    pub raw: f64,
    /// Normalised fair value; equals `raw` when the market could not be normalised
    pub fair_value: f64,
    /// price − fair_value
    pub edge: f64,
    pub category: Category,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub outcome: ScoredOutcome,
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceQuality {
    GoodValue,
    Ok,
    SomewhatExpensive,
    Expensive,
}

/// Likely-winner call for one binary matchup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupCall {
    pub event_title: String,
    pub start_time: Option<DateTime<Utc>>,
    pub favorite: ScoredOutcome,
    pub underdog: ScoredOutcome,
    pub gap: f64,
    pub price_quality: PriceQuality,
}

/// Everything the scanner derived for one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventReport {
    pub title: String,
    pub start_time: Option<DateTime<Utc>>,
    pub volume: f64,
    pub home_team: String,
    pub away_team: String,
    pub estimate: ExternalEstimate,
    pub has_moneyline: bool,
    pub outcomes: Vec<ScoredOutcome>,
    /// Moneyline outcome labels whose price could not be resolved
    pub unpriced: Vec<String>,
    /// Spread and total rows shown for reference only
    pub references: Vec<ReferenceQuote>,
}

/// Unscored spread or total outcome, price in cents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceQuote {
    pub kind: MarketKind,
    pub label: String,
    pub price: Option<f64>,
}

/// Immutable result of one scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub events_listed: usize,
    pub tokens_requested: usize,
    pub prices_resolved: usize,
    pub events: Vec<EventReport>,
    pub opportunities: Vec<Opportunity>,
    pub matchup_calls: Vec<MatchupCall>,
}

/// Row summary of a stored run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: i64,
    pub scan_date: String,
    pub generated_at: DateTime<Utc>,
    pub events: i64,
    pub opportunities: i64,
    pub matchup_calls: i64,
}
