use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use super::provider::MarketDataProvider;
use crate::db::models::{Event, Market, Outcome};
use crate::error::ScanError;

/// Which slice of the Gamma events feed to list.
#[derive(Debug, Clone, Copy)]
pub struct EventQuery {
    pub series_id: u64,
    pub tag_id: u64,
    pub limit: u32,
}

/// Client for the Polymarket Gamma (events) API and CLOB (midpoint) API.
#[derive(Clone)]
pub struct PolymarketClient {
    http: Client,
    gamma_url: String,
    clob_url: String,
    query: EventQuery,
    events_timeout: Duration,
}

impl PolymarketClient {
    pub fn new(
        gamma_url: &str,
        clob_url: &str,
        query: EventQuery,
        events_timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent("Mozilla/5.0")
            .build()
            .context("Failed to build HTTP client")?;
        Ok(PolymarketClient {
            http,
            gamma_url: gamma_url.trim_end_matches('/').to_string(),
            clob_url: clob_url.trim_end_matches('/').to_string(),
            query,
            events_timeout,
        })
    }
}

#[async_trait]
impl MarketDataProvider for PolymarketClient {
    async fn list_events_for_date(&self, date: NaiveDate) -> Result<Vec<Event>> {
        let url = format!("{}/events", self.gamma_url);
        debug!("Listing Gamma events: {} series={}", url, self.query.series_id);

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("series_id", self.query.series_id.to_string()),
                ("tag_id", self.query.tag_id.to_string()),
                ("active", "true".to_string()),
                ("closed", "false".to_string()),
                ("limit", self.query.limit.to_string()),
                ("order", "startTime".to_string()),
                ("ascending", "true".to_string()),
            ])
            .timeout(self.events_timeout)
            .send()
            .await
            .context("Gamma events request failed")?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ScanError::UpstreamStatus {
                service: "Gamma events API",
                status,
                body,
            }
            .into());
        }

        let raw: serde_json::Value = resp
            .json()
            .await
            .context("Failed to parse Gamma events response")?;

        let events = parse_events(&raw, &date.format("%Y-%m-%d").to_string());
        info!("Found {} event(s) scheduled on {}", events.len(), date);
        Ok(events)
    }

    async fn lookup_midpoint(&self, token_id: &str) -> Result<Option<f64>> {
        let url = format!("{}/midpoint", self.clob_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await
            .context("CLOB midpoint request failed")?;

        if !resp.status().is_success() {
            return Err(ScanError::UpstreamStatus {
                service: "CLOB midpoint API",
                status: resp.status().as_u16(),
                body: String::new(),
            }
            .into());
        }

        let raw: serde_json::Value = resp.json().await?;
        Ok(parse_midpoint(&raw))
    }
}

// ── Parsing helpers ────────────────────────────────────────────────────────────

fn parse_events(raw: &serde_json::Value, date: &str) -> Vec<Event> {
    let items = match raw.as_array() {
        Some(a) => a,
        None => match raw.get("events").and_then(|v| v.as_array()) {
            Some(a) => a,
            None => return vec![],
        },
    };

    items
        .iter()
        .filter(|item| {
            item["eventDate"]
                .as_str()
                .map_or(false, |d| d.contains(date))
        })
        .map(|item| Event {
            id: item["id"]
                .as_str()
                .map(str::to_string)
                .or_else(|| item["id"].as_i64().map(|n| n.to_string()))
                .unwrap_or_default(),
            title: item["title"].as_str().unwrap_or("?").to_string(),
            start_time: item["startTime"]
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            volume: number_or_string(&item["volume"]).unwrap_or(0.0),
            markets: item["markets"]
                .as_array()
                .map(|ms| ms.iter().map(parse_market).collect())
                .unwrap_or_default(),
        })
        .collect()
}

fn parse_market(item: &serde_json::Value) -> Market {
    let question = item["question"].as_str().unwrap_or("").to_string();
    let outcomes = pair_outcomes(&item["outcomes"], &item["clobTokenIds"]);
    if outcomes.is_empty() {
        debug!("Market '{}' has no usable outcome/token pairs", question);
    }
    Market {
        question,
        volume: number_or_string(&item["volume"]).unwrap_or(0.0),
        outcomes,
    }
}

/// Pair outcome labels with token IDs. Mismatched lengths or unparsable
/// arrays yield an empty list so the market is dropped downstream.
fn pair_outcomes(labels: &serde_json::Value, token_ids: &serde_json::Value) -> Vec<Outcome> {
    let labels = string_list(labels).unwrap_or_default();
    let token_ids = string_list(token_ids).unwrap_or_default();
    if token_ids.is_empty() || labels.len() != token_ids.len() {
        return vec![];
    }
    labels
        .into_iter()
        .zip(token_ids)
        .map(|(label, token_id)| Outcome { label, token_id })
        .collect()
}

/// Gamma encodes list fields either as JSON arrays or as JSON-encoded strings
/// (`"[\"Knicks\", \"Celtics\"]"`). Token IDs may be numbers.
fn string_list(v: &serde_json::Value) -> Option<Vec<String>> {
    let decoded;
    let array = match v {
        serde_json::Value::String(s) => {
            decoded = serde_json::from_str::<serde_json::Value>(s).ok()?;
            decoded.as_array()?
        }
        serde_json::Value::Array(a) => a,
        _ => return None,
    };
    array
        .iter()
        .map(|item| match item {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

fn number_or_string(v: &serde_json::Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

fn parse_midpoint(raw: &serde_json::Value) -> Option<f64> {
    number_or_string(&raw["mid"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_are_filtered_by_date() {
        let raw = json!([
            { "id": "1", "title": "Knicks vs. Celtics", "eventDate": "2026-01-03", "markets": [] },
            { "id": "2", "title": "Heat vs. Bulls", "eventDate": "2026-01-04", "markets": [] }
        ]);
        let events = parse_events(&raw, "2026-01-03");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Knicks vs. Celtics");
    }

    #[test]
    fn event_fields_are_parsed() {
        let raw = json!([{
            "id": 42,
            "title": "Knicks vs. Celtics",
            "eventDate": "2026-01-03",
            "startTime": "2026-01-04T00:30:00Z",
            "volume": "125000.5",
            "markets": [{
                "question": "Knicks vs. Celtics",
                "volume": 9000,
                "outcomes": "[\"Knicks\", \"Celtics\"]",
                "clobTokenIds": "[\"111\", \"222\"]"
            }]
        }]);
        let events = parse_events(&raw, "2026-01-03");
        let ev = &events[0];
        assert_eq!(ev.id, "42");
        assert_eq!(ev.volume, 125000.5);
        assert_eq!(
            ev.start_time.unwrap().to_rfc3339(),
            "2026-01-04T00:30:00+00:00"
        );
        let market = &ev.markets[0];
        assert_eq!(market.volume, 9000.0);
        assert_eq!(
            market.outcomes,
            vec![
                Outcome { label: "Knicks".into(), token_id: "111".into() },
                Outcome { label: "Celtics".into(), token_id: "222".into() },
            ]
        );
    }

    #[test]
    fn wrapped_events_payload_is_accepted() {
        let raw = json!({ "events": [{ "id": "1", "title": "A vs. B", "eventDate": "2026-01-03" }] });
        assert_eq!(parse_events(&raw, "2026-01-03").len(), 1);
    }

    #[test]
    fn array_encoded_outcomes_and_numeric_tokens() {
        let outcomes = pair_outcomes(&json!(["Over", "Under"]), &json!([1, 2]));
        assert_eq!(outcomes[1].token_id, "2");
        assert_eq!(outcomes[1].label, "Under");
    }

    #[test]
    fn malformed_or_mismatched_arrays_yield_no_outcomes() {
        assert!(pair_outcomes(&json!("[\"Knicks\""), &json!("[\"1\",\"2\"]")).is_empty());
        assert!(pair_outcomes(&json!("[\"Knicks\"]"), &json!("[\"1\",\"2\"]")).is_empty());
        assert!(pair_outcomes(&json!(["A", "B"]), &json!("not json")).is_empty());
        assert!(pair_outcomes(&json!(null), &json!(null)).is_empty());
    }

    #[test]
    fn midpoint_accepts_number_or_string() {
        assert_eq!(parse_midpoint(&json!({ "mid": "0.615" })), Some(0.615));
        assert_eq!(parse_midpoint(&json!({ "mid": 0.4 })), Some(0.4));
        assert_eq!(parse_midpoint(&json!({ "mid": "n/a" })), None);
        assert_eq!(parse_midpoint(&json!({})), None);
    }
}
