use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

pub mod models;
use models::*;

/// Store of completed scan reports (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Runs ──────────────────────────────────────────────────────────────────

    /// Store a completed report with one row per opportunity and matchup call.
    pub fn record_report(&self, report: &Report) -> Result<i64> {
        let snapshot = serde_json::to_string(report).context("Failed to serialize report")?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO runs (scan_date, generated_at, events, opportunities, matchup_calls, report_json)
             VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                report.date.to_string(),
                report.generated_at,
                report.events.len() as i64,
                report.opportunities.len() as i64,
                report.matchup_calls.len() as i64,
                snapshot,
            ],
        )?;
        let run_id = tx.last_insert_rowid();

        for op in &report.opportunities {
            let o = &op.outcome;
            tx.execute(
                "INSERT INTO opportunities (
                    run_id, event_title, outcome, token_id, category,
                    price, fair_value, edge, action
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                params![
                    run_id,
                    o.event_title,
                    o.outcome,
                    o.token_id,
                    format!("{:?}", o.category),
                    o.price,
                    o.fair_value,
                    o.edge,
                    op.action,
                ],
            )?;
        }

        for call in &report.matchup_calls {
            tx.execute(
                "INSERT INTO matchup_calls (
                    run_id, event_title, favorite, underdog,
                    favorite_fair, underdog_fair, favorite_edge, gap, price_quality
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                params![
                    run_id,
                    call.event_title,
                    call.favorite.outcome,
                    call.underdog.outcome,
                    call.favorite.fair_value,
                    call.underdog.fair_value,
                    call.favorite.edge,
                    call.gap,
                    format!("{:?}", call.price_quality),
                ],
            )?;
        }

        tx.commit()?;
        Ok(run_id)
    }

    /// Most recently stored report, if any
    pub fn latest_report(&self) -> Result<Option<Report>> {
        let conn = self.conn()?;
        let snapshot: Option<String> = conn
            .query_row(
                "SELECT report_json FROM runs ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        snapshot
            .map(|s| serde_json::from_str(&s).context("Stored report is not valid JSON"))
            .transpose()
    }

    /// List recent runs, newest first
    pub fn list_runs(&self, limit: i64) -> Result<Vec<RunRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, scan_date, generated_at, events, opportunities, matchup_calls
             FROM runs ORDER BY id DESC LIMIT ?1",
        )?;
        let runs = stmt
            .query_map(params![limit], map_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn map_run(row: &rusqlite::Row) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        scan_date: row.get(1)?,
        generated_at: row.get(2)?,
        events: row.get(3)?,
        opportunities: row.get(4)?,
        matchup_calls: row.get(5)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_date     TEXT    NOT NULL,
    generated_at  TEXT    NOT NULL,
    events        INTEGER NOT NULL,
    opportunities INTEGER NOT NULL,
    matchup_calls INTEGER NOT NULL,
    report_json   TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS opportunities (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id      INTEGER NOT NULL,
    event_title TEXT    NOT NULL,
    outcome     TEXT    NOT NULL,
    token_id    TEXT    NOT NULL,
    category    TEXT    NOT NULL,
    price       REAL    NOT NULL,
    fair_value  REAL    NOT NULL,
    edge        REAL    NOT NULL,
    action      TEXT    NOT NULL,
    FOREIGN KEY (run_id) REFERENCES runs(id)
);

CREATE TABLE IF NOT EXISTS matchup_calls (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id        INTEGER NOT NULL,
    event_title   TEXT    NOT NULL,
    favorite      TEXT    NOT NULL,
    underdog      TEXT    NOT NULL,
    favorite_fair REAL    NOT NULL,
    underdog_fair REAL    NOT NULL,
    favorite_edge REAL    NOT NULL,
    gap           REAL    NOT NULL,
    price_quality TEXT    NOT NULL,
    FOREIGN KEY (run_id) REFERENCES runs(id)
);

CREATE INDEX IF NOT EXISTS idx_opportunities_run ON opportunities(run_id);
CREATE INDEX IF NOT EXISTS idx_matchup_calls_run ON matchup_calls(run_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn outcome(name: &str, price: f64, fair: f64, category: Category) -> ScoredOutcome {
        ScoredOutcome {
            event_title: "Knicks vs. Celtics".to_string(),
            start_time: None,
            outcome: name.to_string(),
            token_id: format!("tok-{}", name),
            side: Side::Home,
            price,
            vegas: 50.0,
            news: 0.0,
            news_norm: 50.0,
            form: 50.0,
            home_field: 5.0,
            missing_stars: 0,
            penalty: 1.0,
            raw: fair,
            fair_value: fair,
            edge: price - fair,
            category,
        }
    }

    fn sample_report() -> Report {
        let fav = outcome("Celtics", 50.0, 75.0, Category::Scalp);
        let dog = outcome("Knicks", 50.0, 25.0, Category::Avoid);
        Report {
            date: NaiveDate::from_ymd_opt(2026, 1, 3).unwrap(),
            generated_at: Utc::now(),
            events_listed: 1,
            tokens_requested: 2,
            prices_resolved: 2,
            events: vec![],
            opportunities: vec![
                Opportunity {
                    outcome: fav.clone(),
                    action: "SCALP".to_string(),
                },
                Opportunity {
                    outcome: dog.clone(),
                    action: "AVOID".to_string(),
                },
            ],
            matchup_calls: vec![MatchupCall {
                event_title: fav.event_title.clone(),
                start_time: None,
                favorite: fav,
                underdog: dog,
                gap: 50.0,
                price_quality: PriceQuality::GoodValue,
            }],
        }
    }

    #[test]
    fn empty_store_has_no_latest_report() {
        let db = Database::open(":memory:").unwrap();
        assert!(db.latest_report().unwrap().is_none());
        assert!(db.list_runs(10).unwrap().is_empty());
    }

    #[test]
    fn recorded_report_is_returned_as_latest() {
        let db = Database::open(":memory:").unwrap();
        let report = sample_report();
        let id = db.record_report(&report).unwrap();

        let runs = db.list_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, id);
        assert_eq!(runs[0].opportunities, 2);
        assert_eq!(runs[0].matchup_calls, 1);
        assert_eq!(runs[0].scan_date, "2026-01-03");

        let latest = db.latest_report().unwrap().unwrap();
        assert_eq!(latest.opportunities.len(), 2);
        assert_eq!(latest.matchup_calls[0].favorite.outcome, "Celtics");
    }

    #[test]
    fn runs_are_listed_newest_first() {
        let db = Database::open(":memory:").unwrap();
        let first = db.record_report(&sample_report()).unwrap();
        let second = db.record_report(&sample_report()).unwrap();
        let runs = db.list_runs(10).unwrap();
        assert_eq!(
            runs.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![second, first]
        );
        assert_eq!(db.list_runs(1).unwrap().len(), 1);
    }
}
