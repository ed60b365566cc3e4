//! Edge classification and the labels attached to each category.

use crate::config::ScoringThresholds;
use crate::db::models::{Category, PriceQuality};

/// Map an edge (price − fair, in points) to exactly one category.
///
/// A deep discount only counts as a scalp when the side is a credible
/// winner (`fair ≥ scalp_floor`); otherwise it is an ordinary buy.
pub fn classify_edge(edge: f64, fair_value: f64, thresholds: &ScoringThresholds) -> Category {
    if edge <= -thresholds.scalp_min {
        if fair_value >= thresholds.scalp_floor {
            Category::Scalp
        } else {
            Category::Buy
        }
    } else if edge <= -thresholds.nea_min {
        Category::Buy
    } else if edge >= thresholds.nea_min {
        Category::Avoid
    } else {
        Category::Fair
    }
}

impl Category {
    /// Recommended action; `None` for fairly priced outcomes.
    pub fn action(&self) -> Option<&'static str> {
        match self {
            Category::Scalp => Some("SCALP: buy pre-game, sell before tip-off"),
            Category::Buy => Some("BUY (priced low)"),
            Category::Avoid => Some("AVOID (priced high)"),
            Category::Fair => None,
        }
    }

    /// One-line explanation of the edge for the report
    pub fn describe(&self, edge: f64) -> String {
        match self {
            Category::Scalp => format!(
                "{:.1} pts discount on a credible winner; expect repricing before the game",
                -edge
            ),
            Category::Buy => format!("price {:.1} pts below fair value", -edge),
            Category::Avoid => format!("price {:.1} pts above fair value", edge),
            Category::Fair => format!("fairly priced (edge {:+.1})", edge),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Scalp => "SCALP",
            Category::Buy => "BUY",
            Category::Avoid => "AVOID",
            Category::Fair => "FAIR",
        }
    }
}

/// Quality of the favourite's price, from its edge
pub fn price_quality(edge: f64) -> PriceQuality {
    if edge <= 0.0 {
        PriceQuality::GoodValue
    } else if edge <= 10.0 {
        PriceQuality::Ok
    } else if edge <= 20.0 {
        PriceQuality::SomewhatExpensive
    } else {
        PriceQuality::Expensive
    }
}

impl PriceQuality {
    pub fn label(&self) -> &'static str {
        match self {
            PriceQuality::GoodValue => "priced low, good value",
            PriceQuality::Ok => "ok price",
            PriceQuality::SomewhatExpensive => "somewhat expensive",
            PriceQuality::Expensive => "expensive",
        }
    }
}
