//! Gemini-backed estimate provider with Google Search grounding.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::provider::EstimateProvider;
use crate::error::ScanError;

pub struct GeminiProvider {
    http: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(90))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(GeminiProvider {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

fn build_prompt(home_team: &str, away_team: &str) -> String {
    format!(
        r#"You are an expert NBA betting analyst.
Analyse TODAY's game: {away} (away) @ {home} (home).

Using web search, answer EXACTLY in this JSON format (no markdown, no explanations):

{{
  "home_win_prob": <number 0-100, implied win probability of the HOME team from today's bookmaker odds>,
  "home_news": <number -100 to 100, news factor for the home team: key injuries (-), full lineup (+)>,
  "away_news": <number -100 to 100, news factor for the away team>,
  "home_form": <number 0-100, home team form over the last 5 games: 5 wins=100, 0 wins=0>,
  "away_form": <number 0-100, away team form over the last 5 games>,
  "home_missing_stars": <integer 0-5, All-Star or >18 PPG players ruled out TODAY for the home team>,
  "away_missing_stars": <integer 0-5, All-Star or >18 PPG players ruled out TODAY for the away team>,
  "summary": "<2 sentences: current state of both teams, key injuries and game context>"
}}

Look specifically for:
1. Current odds from books such as DraftKings, FanDuel or BetMGM for {home} vs {away}
2. Confirmed injuries or absences for TODAY, especially All-Star or >18 PPG players
3. Results of each team's last 5 games

Reply ONLY with the JSON."#,
        home = home_team,
        away = away_team,
    )
}

#[derive(Serialize)]
struct Request {
    contents: Vec<Content>,
    tools: Vec<serde_json::Value>,
    #[serde(rename = "generationConfig")]
    generation_config: serde_json::Value,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[async_trait]
impl EstimateProvider for GeminiProvider {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn request(&self, home_team: &str, away_team: &str) -> Result<String> {
        let request = Request {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart {
                    text: build_prompt(home_team, away_team),
                }],
            }],
            tools: vec![json!({ "google_search": {} })],
            generation_config: json!({ "thinkingConfig": { "thinkingBudget": 0 } }),
        };

        let url = format!("{}/models/{}:generateContent", self.api_url, self.model);
        debug!("Requesting estimate for {} @ {}", away_team, home_team);

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Gemini request failed")?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ScanError::UpstreamStatus {
                service: "Gemini API",
                status,
                body,
            }
            .into());
        }

        let response: Response = resp
            .json()
            .await
            .context("Failed to parse Gemini response")?;
        Ok(collect_text(response))
    }
}

fn collect_text(response: Response) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default()
}
