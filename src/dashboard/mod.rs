use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::bot::Scanner;
use crate::config::Config;
use crate::db::models::Report;
use crate::db::Database;
use crate::estimate::EstimateProvider;
use crate::polymarket::MarketDataProvider;

const LIVE_CAPACITY: usize = 1024;

/// Message pushed to `/api/stream` subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StreamMessage {
    Line { line: String },
    Done { done: bool, completed: bool },
}

/// Progress of the current (or last) run
#[derive(Debug, Default)]
struct RunState {
    running: bool,
    completed: bool,
    lines: Vec<String>,
    error: Option<String>,
    report: Option<Report>,
}

#[derive(Clone)]
pub struct AppState {
    config: Config,
    market_data: Arc<dyn MarketDataProvider>,
    estimate_provider: Arc<dyn EstimateProvider>,
    db: Option<Database>,
    run: Arc<Mutex<RunState>>,
    live: broadcast::Sender<StreamMessage>,
}

impl AppState {
    pub fn new(
        config: Config,
        market_data: Arc<dyn MarketDataProvider>,
        estimate_provider: Arc<dyn EstimateProvider>,
        db: Option<Database>,
    ) -> Self {
        let (live, _) = broadcast::channel(LIVE_CAPACITY);
        AppState {
            config,
            market_data,
            estimate_provider,
            db,
            run: Arc::new(Mutex::new(RunState::default())),
            live,
        }
    }

    /// Start a scan in the background. `false` if one is already running.
    pub async fn start_run(&self) -> bool {
        {
            let mut run = self.run.lock().await;
            if run.running {
                return false;
            }
            *run = RunState {
                running: true,
                ..RunState::default()
            };
        }

        let state = self.clone();
        tokio::spawn(async move { state.execute().await });
        true
    }

    async fn execute(self) {
        let scanner = Scanner::new(
            self.market_data.clone(),
            self.estimate_provider.clone(),
            self.config.scan_settings(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let forward_state = self.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                forward_state.push_line(line).await;
            }
        });

        let result = scanner.run(&tx).await;
        drop(tx);
        if let Err(e) = forwarder.await {
            warn!("Line forwarder ended abnormally: {}", e);
        }

        let completed = match result {
            Ok(report) => {
                if let Some(db) = &self.db {
                    match db.record_report(&report) {
                        Ok(id) => info!("Stored run #{}", id),
                        Err(e) => warn!("Failed to store run: {:#}", e),
                    }
                }
                self.run.lock().await.report = Some(report);
                true
            }
            Err(e) => {
                error!("Scan failed: {:#}", e);
                self.push_line(format!("ERROR: {:#}", e)).await;
                self.run.lock().await.error = Some(format!("{:#}", e));
                false
            }
        };

        let mut run = self.run.lock().await;
        run.running = false;
        run.completed = completed;
        let _ = self.live.send(StreamMessage::Done {
            done: true,
            completed,
        });
    }

    /// Buffer and broadcast under the same lock so a subscriber that
    /// snapshots the buffer never misses or duplicates a line.
    async fn push_line(&self, line: String) {
        let mut run = self.run.lock().await;
        run.lines.push(line.clone());
        // No receivers is fine.
        let _ = self.live.send(StreamMessage::Line { line });
    }
}

/// Build the Axum router for the dashboard.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/run", post(run_handler))
        .route("/api/stream", get(stream_handler))
        .route("/api/status", get(status_handler))
        .route("/api/results", get(results_handler))
        .route("/api/runs", get(runs_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

async fn index_handler() -> impl IntoResponse {
    Html(DASHBOARD_HTML)
}

/// POST /api/run
async fn run_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.start_run().await {
        (StatusCode::OK, Json(json!({ "status": "started" })))
    } else {
        (
            StatusCode::CONFLICT,
            Json(json!({ "error": "a scan is already running" })),
        )
    }
}

/// GET /api/status
async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let run = state.run.lock().await;
    Json(json!({
        "running": run.running,
        "completed": run.completed,
        "lines": run.lines.len(),
        "error": run.error,
        "report_date": run.report.as_ref().map(|r| r.date),
    }))
}

/// GET /api/results
async fn results_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Report>, (StatusCode, String)> {
    {
        let run = state.run.lock().await;
        if let Some(report) = &run.report {
            return Ok(Json(report.clone()));
        }
        if let Some(error) = &run.error {
            return Err((StatusCode::NOT_FOUND, format!("last scan failed: {}", error)));
        }
    }
    let stored = match &state.db {
        Some(db) => db
            .latest_report()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?,
        None => None,
    };
    stored
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "no completed scan yet".to_string()))
}

/// GET /api/runs
async fn runs_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match &state.db {
        Some(db) => db
            .list_runs(50)
            .map(Json)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
        None => Ok(Json(vec![])),
    }
}

/// GET /api/stream (WebSocket)
async fn stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_lines(socket, state))
}

async fn stream_lines(mut socket: WebSocket, state: Arc<AppState>) {
    let (backlog, running, completed, mut live) = {
        let run = state.run.lock().await;
        (
            run.lines.clone(),
            run.running,
            run.completed,
            state.live.subscribe(),
        )
    };

    for line in backlog {
        if send(&mut socket, &StreamMessage::Line { line }).await.is_err() {
            return;
        }
    }
    if !running {
        let _ = send(&mut socket, &StreamMessage::Done { done: true, completed }).await;
        return;
    }

    while let Some(msg) = next_message(live.recv().await) {
        let finished = matches!(msg, StreamMessage::Done { .. });
        if send(&mut socket, &msg).await.is_err() || finished {
            return;
        }
    }
}

/// Next message for a subscriber; a lag becomes a visible gap marker.
fn next_message(
    received: Result<StreamMessage, broadcast::error::RecvError>,
) -> Option<StreamMessage> {
    match received {
        Ok(msg) => Some(msg),
        Err(broadcast::error::RecvError::Lagged(n)) => {
            warn!("Stream subscriber lagged; {} line(s) skipped", n);
            Some(StreamMessage::Line {
                line: format!("... {} line(s) skipped; reload to see the full log ...", n),
            })
        }
        Err(broadcast::error::RecvError::Closed) => None,
    }
}

async fn send(socket: &mut WebSocket, msg: &StreamMessage) -> Result<(), axum::Error> {
    let text = serde_json::to_string(msg).unwrap_or_default();
    socket.send(Message::Text(text)).await
}

/// Embedded single-page dashboard (HTML + CSS + JS)
const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Sports Edge Scanner</title>
<style>
  :root {
    --bg: #0f1117;
    --card: #1a1d27;
    --border: #2a2d3a;
    --accent: #6c63ff;
    --green: #00c896;
    --red: #ff4f6a;
    --text: #e0e0e0;
    --muted: #8888aa;
  }
  * { box-sizing: border-box; margin: 0; padding: 0; }
  body { background: var(--bg); color: var(--text); font-family: 'Segoe UI', system-ui, sans-serif; }
  header { display: flex; align-items: center; gap: 1rem; padding: 1rem 2rem; border-bottom: 1px solid var(--border); }
  header h1 { font-size: 1.4rem; font-weight: 700; flex: 1; }
  button { background: var(--accent); color: #fff; border: none; border-radius: 6px; padding: .6rem 1.2rem; font-weight: 600; cursor: pointer; }
  button:disabled { opacity: .5; cursor: default; }
  .status { color: var(--muted); font-size: .85rem; }
  .status.ok { color: var(--green); }
  .status.err { color: var(--red); }
  .status-dot { width: 10px; height: 10px; border-radius: 50%; background: var(--green); display: none; animation: pulse 1.5s infinite; }
  .status-dot.on { display: inline-block; }
  @keyframes pulse { 0%,100% { opacity: 1; } 50% { opacity: .3; } }
  main { padding: 1.5rem 2rem; }
  .panel { background: var(--card); border: 1px solid var(--border); border-radius: 10px; overflow: hidden; }
  .panel-header { padding: .9rem 1.2rem; border-bottom: 1px solid var(--border); font-weight: 600; }
  #log { font-family: ui-monospace, Menlo, Consolas, monospace; font-size: .82rem; white-space: pre; padding: 1rem; height: 75vh; overflow: auto; }
  .empty { color: var(--muted); text-align: center; padding: 2rem; font-size: .9rem; }
</style>
</head>
<body>
<header>
  <h1>Sports Edge Scanner</h1>
  <span class="status-dot" id="dot"></span>
  <span class="status" id="status">idle</span>
  <button id="run">Run scan</button>
</header>
<main>
  <div class="panel">
    <div class="panel-header">Report</div>
    <div id="log"><div class="empty">Press "Run scan" to analyse today's games.</div></div>
  </div>
</main>
<script>
const log = document.getElementById('log');
const btn = document.getElementById('run');
const statusEl = document.getElementById('status');
const dot = document.getElementById('dot');

function setStatus(text, cls, running) {
  statusEl.textContent = text;
  statusEl.className = 'status ' + (cls || '');
  dot.className = 'status-dot' + (running ? ' on' : '');
  btn.disabled = running;
}

function follow() {
  log.textContent = '';
  const proto = location.protocol === 'https:' ? 'wss' : 'ws';
  const ws = new WebSocket(`${proto}://${location.host}/api/stream`);
  ws.onmessage = (ev) => {
    const msg = JSON.parse(ev.data);
    if (msg.line !== undefined) {
      log.textContent += msg.line + '\n';
      log.scrollTop = log.scrollHeight;
    } else if (msg.done) {
      setStatus(msg.completed ? 'completed' : 'failed', msg.completed ? 'ok' : 'err', false);
      ws.close();
    }
  };
  ws.onerror = () => setStatus('stream error', 'err', false);
}

btn.onclick = async () => {
  const r = await fetch('/api/run', { method: 'POST' });
  if (r.status === 409) {
    setStatus('a scan is already running', 'err', true);
  } else if (!r.ok) {
    setStatus('failed to start', 'err', false);
    return;
  } else {
    setStatus('running...', '', true);
  }
  follow();
};

(async () => {
  const r = await fetch('/api/status');
  if (!r.ok) return;
  const s = await r.json();
  if (s.running) { setStatus('running...', '', true); follow(); }
  else if (s.lines > 0) { setStatus(s.completed ? 'completed' : 'failed', s.completed ? 'ok' : 'err', false); follow(); }
})();
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Event, Market, Outcome};
    use crate::estimate::tests::{response, ScriptedProvider};
    use crate::polymarket::prices::tests::MockMarketData;
    use clap::Parser;
    use std::collections::HashMap;
    use std::time::Duration;

    fn config() -> Config {
        Config::try_parse_from([
            "sports-edge-scanner",
            "--gemini-api-key",
            "k",
            "--date",
            "2026-01-15",
            "--estimate-samples",
            "1",
        ])
        .unwrap()
    }

    fn mock() -> MockMarketData {
        MockMarketData {
            events: vec![Event {
                id: "1".into(),
                title: "Knicks vs. Celtics".into(),
                start_time: None,
                volume: 0.0,
                markets: vec![Market {
                    question: "Knicks vs. Celtics".into(),
                    volume: 1.0,
                    outcomes: vec![
                        Outcome { label: "Knicks".into(), token_id: "a".into() },
                        Outcome { label: "Celtics".into(), token_id: "h".into() },
                    ],
                }],
            }],
            midpoints: HashMap::from([
                ("a".to_string(), Some(0.4)),
                ("h".to_string(), Some(0.6)),
            ]),
            ..Default::default()
        }
    }

    async fn wait_idle(state: &AppState) {
        for _ in 0..200 {
            if !state.run.lock().await.running {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run did not finish");
    }

    #[test]
    fn stream_messages_serialize_flat() {
        let line = serde_json::to_value(StreamMessage::Line { line: "x".into() }).unwrap();
        assert_eq!(line, json!({ "line": "x" }));
        let done = serde_json::to_value(StreamMessage::Done { done: true, completed: false }).unwrap();
        assert_eq!(done, json!({ "done": true, "completed": false }));
    }

    #[tokio::test]
    async fn second_run_is_rejected_while_running() {
        let provider = ScriptedProvider::new(vec![response(65.0, "ok")]);
        let mut market_data = mock();
        // Keep the first run busy on a price lookup.
        market_data.slow = vec!["a".to_string()];
        let state = AppState::new(config(), Arc::new(market_data), Arc::new(provider), None);

        assert!(state.start_run().await);
        assert!(!state.start_run().await);
    }

    #[tokio::test]
    async fn completed_run_buffers_lines_and_report() {
        let provider = ScriptedProvider::new(vec![response(65.0, "ok")]);
        let db = Database::open(":memory:").unwrap();
        let state = AppState::new(config(), Arc::new(mock()), Arc::new(provider), Some(db.clone()));
        let mut live = state.live.subscribe();

        assert!(state.start_run().await);
        wait_idle(&state).await;

        let run = state.run.lock().await;
        assert!(run.completed);
        assert!(run.error.is_none());
        assert!(run.lines.iter().any(|l| l.contains("KNICKS VS. CELTICS")));
        assert_eq!(run.report.as_ref().unwrap().matchup_calls.len(), 1);
        assert_eq!(db.list_runs(10).unwrap().len(), 1);

        // Every buffered line was broadcast, in order, followed by the done marker.
        let mut received = vec![];
        while let Ok(msg) = live.try_recv() {
            received.push(msg);
        }
        let lines: Vec<String> = received
            .iter()
            .filter_map(|m| match m {
                StreamMessage::Line { line } => Some(line.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(lines, run.lines);
        assert_eq!(
            received.last(),
            Some(&StreamMessage::Done { done: true, completed: true })
        );
    }

    #[tokio::test]
    async fn lagging_subscriber_sees_skip_marker() {
        let (tx, mut rx) = broadcast::channel(1);
        for i in 0..3 {
            tx.send(StreamMessage::Line { line: i.to_string() }).unwrap();
        }
        match next_message(rx.recv().await) {
            Some(StreamMessage::Line { line }) => assert!(line.contains("2 line(s) skipped")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            next_message(rx.recv().await),
            Some(StreamMessage::Line { line: "2".into() })
        );
        drop(tx);
        assert_eq!(next_message(rx.recv().await), None);
    }

    #[tokio::test]
    async fn failed_run_records_error_line() {
        let provider = ScriptedProvider::new(vec![]);
        let market_data = MockMarketData {
            fail_listing: true,
            ..Default::default()
        };
        let state = AppState::new(config(), Arc::new(market_data), Arc::new(provider), None);
        state.run.lock().await.report = Some(stale_report());

        assert!(state.start_run().await);
        wait_idle(&state).await;

        {
            let run = state.run.lock().await;
            assert!(!run.completed);
            assert!(run.error.is_some());
            assert!(run.lines.last().unwrap().starts_with("ERROR: "));
            assert!(run.report.is_none());
        }

        // The previous run's report is not served as the current result.
        let err = results_handler(State(Arc::new(state.clone()))).await.unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
        assert!(err.1.starts_with("last scan failed"));
    }

    fn stale_report() -> Report {
        Report {
            date: chrono::NaiveDate::from_ymd_opt(2026, 1, 14).unwrap(),
            generated_at: chrono::Utc::now(),
            events_listed: 0,
            tokens_requested: 0,
            prices_resolved: 0,
            events: vec![],
            opportunities: vec![],
            matchup_calls: vec![],
        }
    }
}
