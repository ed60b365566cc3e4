//! Extraction of the structured estimate from free-form provider text.

use serde_json::{Map, Value};

use crate::error::ScanError;

/// One successful provider response, before averaging.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateSample {
    pub home_win_prob: f64,
    pub home_news: f64,
    pub away_news: f64,
    pub home_form: f64,
    pub away_form: f64,
    pub home_missing_stars: f64,
    pub away_missing_stars: f64,
    pub summary: String,
}

pub const DEFAULT_SUMMARY: &str = "No analysis available.";

/// Locate the `{ ... }` object in `text` (first `{` to last `}`, after
/// stripping markdown fences) and decode it into a sample.
pub fn parse_sample(text: &str) -> Result<EstimateSample, ScanError> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let start = cleaned.find('{').ok_or(ScanError::MissingPayload)?;
    let end = cleaned.rfind('}').ok_or(ScanError::MissingPayload)?;
    if end < start {
        return Err(ScanError::MissingPayload);
    }

    let value: Value = serde_json::from_str(&cleaned[start..=end])
        .map_err(|e| ScanError::MalformedPayload(e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| ScanError::MalformedPayload("payload is not an object".into()))?;

    Ok(EstimateSample {
        home_win_prob: number(obj, "home_win_prob", 50.0)?,
        home_news: number(obj, "home_news", 0.0)?,
        away_news: number(obj, "away_news", 0.0)?,
        home_form: number(obj, "home_form", 50.0)?,
        away_form: number(obj, "away_form", 50.0)?,
        // Star counts are whole players; fractional answers are truncated.
        home_missing_stars: number(obj, "home_missing_stars", 0.0)?.trunc(),
        away_missing_stars: number(obj, "away_missing_stars", 0.0)?.trunc(),
        summary: match obj.get("summary") {
            Some(Value::String(s)) => s.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => DEFAULT_SUMMARY.to_string(),
        },
    })
}

/// Absent keys take `default`; present keys must be a number or numeric string.
fn number(obj: &Map<String, Value>, key: &str, default: f64) -> Result<f64, ScanError> {
    let parsed = match obj.get(key) {
        None => return Ok(default),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| ScanError::MalformedPayload(format!("field '{}' is not numeric", key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
        "home_win_prob": 64.5,
        "home_news": -20,
        "away_news": 10,
        "home_form": 80,
        "away_form": 40,
        "home_missing_stars": 1,
        "away_missing_stars": 3,
        "summary": "Home side healthy; visitors missing two starters."
    }"#;

    #[test]
    fn parses_bare_object() {
        let s = parse_sample(FULL).unwrap();
        assert_eq!(s.home_win_prob, 64.5);
        assert_eq!(s.home_news, -20.0);
        assert_eq!(s.away_missing_stars, 3.0);
        assert!(s.summary.starts_with("Home side"));
    }

    #[test]
    fn extracts_object_from_fenced_prose() {
        let text = format!("Here is the analysis:\n```json\n{}\n```\nGood luck!", FULL);
        let s = parse_sample(&text).unwrap();
        assert_eq!(s.away_form, 40.0);
    }

    #[test]
    fn absent_keys_take_defaults() {
        let s = parse_sample(r#"{"home_win_prob": 70}"#).unwrap();
        assert_eq!(s.home_win_prob, 70.0);
        assert_eq!(s.home_news, 0.0);
        assert_eq!(s.home_form, 50.0);
        assert_eq!(s.away_form, 50.0);
        assert_eq!(s.home_missing_stars, 0.0);
        assert_eq!(s.summary, DEFAULT_SUMMARY);
    }

    #[test]
    fn numeric_strings_are_accepted_and_stars_truncated() {
        let s = parse_sample(r#"{"home_win_prob": "58", "away_missing_stars": 2.8}"#).unwrap();
        assert_eq!(s.home_win_prob, 58.0);
        assert_eq!(s.away_missing_stars, 2.0);
    }

    #[test]
    fn no_object_is_missing_payload() {
        assert!(matches!(
            parse_sample("I could not find odds for this game."),
            Err(ScanError::MissingPayload)
        ));
        assert!(matches!(parse_sample("} backwards {"), Err(ScanError::MissingPayload)));
    }

    #[test]
    fn bad_json_or_non_numeric_field_is_malformed() {
        assert!(matches!(
            parse_sample("{ home_win_prob: 55 }"),
            Err(ScanError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_sample(r#"{"home_win_prob": "likely"}"#),
            Err(ScanError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_sample(r#"{"home_form": null}"#),
            Err(ScanError::MalformedPayload(_))
        ));
    }
}
