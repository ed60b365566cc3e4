use chrono::NaiveDate;
use clap::Parser;
use std::time::Duration;

/// Polymarket sports edge scanner
#[derive(Parser, Debug, Clone)]
#[command(name = "sports-edge-scanner", version, about)]
pub struct Config {
    /// Date to scan (YYYY-MM-DD). Defaults to today in local time.
    #[arg(long, env = "SCAN_DATE")]
    pub date: Option<NaiveDate>,

    /// Gamma series ID of the sport to scan (10345 = NBA)
    #[arg(long, env = "SERIES_ID", default_value = "10345")]
    pub series_id: u64,

    /// Gamma tag ID used to narrow the series to game events
    #[arg(long, env = "TAG_ID", default_value = "100639")]
    pub tag_id: u64,

    /// Maximum number of events requested from Gamma
    #[arg(long, env = "EVENT_LIMIT", default_value = "100")]
    pub event_limit: u32,

    /// Polymarket Gamma (events/markets) API base URL
    #[arg(
        long,
        env = "GAMMA_API_URL",
        default_value = "https://gamma-api.polymarket.com"
    )]
    pub gamma_api_url: String,

    /// Polymarket CLOB (Central Limit Order Book) URL
    #[arg(
        long,
        env = "CLOB_API_URL",
        default_value = "https://clob.polymarket.com"
    )]
    pub clob_api_url: String,

    /// Gemini API key used for the external matchup estimate
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Gemini model name
    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-3-flash-preview")]
    pub gemini_model: String,

    /// Gemini REST base URL
    #[arg(
        long,
        env = "GEMINI_API_URL",
        default_value = "https://generativelanguage.googleapis.com/v1beta"
    )]
    pub gemini_api_url: String,

    /// Maximum concurrent midpoint lookups
    #[arg(long, env = "PRICE_WORKERS", default_value = "30")]
    pub price_workers: usize,

    /// Per-lookup deadline for midpoint requests, in seconds
    #[arg(long, env = "PRICE_TIMEOUT_SECS", default_value = "8")]
    pub price_timeout_secs: u64,

    /// Deadline for the event listing request, in seconds
    #[arg(long, env = "EVENTS_TIMEOUT_SECS", default_value = "15")]
    pub events_timeout_secs: u64,

    /// Estimate provider invocations per matchup (averaged)
    #[arg(long, env = "ESTIMATE_SAMPLES", default_value = "5")]
    pub estimate_samples: usize,

    /// Matchups estimated concurrently (samples within a matchup stay sequential)
    #[arg(long, env = "ESTIMATE_CONCURRENCY", default_value = "4")]
    pub estimate_concurrency: usize,

    /// Max deviation from the mean above which a sampled field is flagged
    #[arg(long, env = "OUTLIER_DEVIATION", default_value = "20.0")]
    pub outlier_deviation: f64,

    /// Minimum |edge| (points) to act on an outcome
    #[arg(long, env = "NEA_MIN", default_value = "5.0")]
    pub nea_min: f64,

    /// Minimum discount (points) for a scalp
    #[arg(long, env = "SCALP_MIN", default_value = "20.0")]
    pub scalp_min: f64,

    /// Minimum fair value for a scalp
    #[arg(long, env = "SCALP_FLOOR", default_value = "40.0")]
    pub scalp_floor: f64,

    /// Minimum fair-value gap between both sides for a likely-winner call
    #[arg(long, env = "GAP_MIN", default_value = "15.0")]
    pub gap_min: f64,

    /// Serve the web dashboard instead of running a single scan
    #[arg(long, env = "DASHBOARD", default_value = "false")]
    pub dashboard: bool,

    /// Dashboard listen address
    #[arg(long, env = "DASHBOARD_ADDR", default_value = "0.0.0.0:5000")]
    pub dashboard_addr: String,

    /// SQLite database path; completed runs are stored when set
    #[arg(long, env = "DATABASE_PATH")]
    pub database_path: Option<String>,
}

/// Edge / gap thresholds used by the scoring engine and the ranker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringThresholds {
    pub nea_min: f64,
    pub scalp_min: f64,
    pub scalp_floor: f64,
    pub gap_min: f64,
}

impl Default for ScoringThresholds {
    fn default() -> Self {
        ScoringThresholds {
            nea_min: 5.0,
            scalp_min: 20.0,
            scalp_floor: 40.0,
            gap_min: 15.0,
        }
    }
}

/// Run-level settings handed to the scanner and its components.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub date: NaiveDate,
    pub price_workers: usize,
    pub price_timeout: Duration,
    pub estimate_samples: usize,
    pub estimate_concurrency: usize,
    pub outlier_deviation: f64,
    pub thresholds: ScoringThresholds,
}

impl ScanSettings {
    pub fn for_date(date: NaiveDate) -> Self {
        ScanSettings {
            date,
            price_workers: 30,
            price_timeout: Duration::from_secs(8),
            estimate_samples: 5,
            estimate_concurrency: 4,
            outlier_deviation: 20.0,
            thresholds: ScoringThresholds::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.gemini_api_key.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!("GEMINI_API_KEY is required to estimate matchups.");
        }
        if self.price_workers == 0 {
            anyhow::bail!("price_workers must be at least 1");
        }
        if self.estimate_samples == 0 {
            anyhow::bail!("estimate_samples must be at least 1");
        }
        if self.estimate_concurrency == 0 {
            anyhow::bail!("estimate_concurrency must be at least 1");
        }
        if self.price_timeout_secs == 0 || self.events_timeout_secs == 0 {
            anyhow::bail!("request timeouts must be positive");
        }
        if self.outlier_deviation < 0.0 {
            anyhow::bail!("outlier_deviation must be non-negative");
        }
        if self.nea_min < 0.0 || self.scalp_min < self.nea_min {
            anyhow::bail!("thresholds must satisfy 0 <= nea_min <= scalp_min");
        }
        if !(0.0..=100.0).contains(&self.scalp_floor) {
            anyhow::bail!("scalp_floor must be between 0 and 100");
        }
        if !(0.0..=100.0).contains(&self.gap_min) {
            anyhow::bail!("gap_min must be between 0 and 100");
        }
        Ok(())
    }

    pub fn thresholds(&self) -> ScoringThresholds {
        ScoringThresholds {
            nea_min: self.nea_min,
            scalp_min: self.scalp_min,
            scalp_floor: self.scalp_floor,
            gap_min: self.gap_min,
        }
    }

    /// Settings for a run. A missing `--date` resolves to today at call time,
    /// so a long-lived dashboard always scans the current day.
    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            date: self
                .date
                .unwrap_or_else(|| chrono::Local::now().date_naive()),
            price_workers: self.price_workers,
            price_timeout: Duration::from_secs(self.price_timeout_secs),
            estimate_samples: self.estimate_samples,
            estimate_concurrency: self.estimate_concurrency,
            outlier_deviation: self.outlier_deviation,
            thresholds: self.thresholds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["sports-edge-scanner", "--gemini-api-key", "k"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).expect("valid args")
    }

    #[test]
    fn defaults_validate() {
        let config = parse(&[]);
        config.validate().unwrap();
        assert_eq!(config.price_workers, 30);
        assert_eq!(config.estimate_samples, 5);
        assert_eq!(config.thresholds(), ScoringThresholds::default());
    }

    #[test]
    fn scalp_min_below_nea_min_is_rejected() {
        let config = parse(&["--nea-min", "10", "--scalp-min", "5"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let config = parse(&["--price-workers", "0"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_date_is_used() {
        let config = parse(&["--date", "2026-01-03"]);
        let settings = config.scan_settings();
        assert_eq!(settings.date, NaiveDate::from_ymd_opt(2026, 1, 3).unwrap());
        assert_eq!(settings.price_timeout, Duration::from_secs(8));
    }
}
