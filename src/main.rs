use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

mod bot;
mod config;
mod dashboard;
mod db;
mod error;
mod estimate;
mod polymarket;

use bot::Scanner;
use config::Config;
use dashboard::AppState;
use db::Database;
use estimate::{EstimateProvider, GeminiProvider};
use polymarket::{EventQuery, MarketDataProvider, PolymarketClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the report.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    config.validate()?;

    let db = match &config.database_path {
        Some(path) => {
            let db = Database::open(path)?;
            info!("Database opened: {}", path);
            Some(db)
        }
        None => None,
    };

    let market_data: Arc<dyn MarketDataProvider> = Arc::new(PolymarketClient::new(
        &config.gamma_api_url,
        &config.clob_api_url,
        EventQuery {
            series_id: config.series_id,
            tag_id: config.tag_id,
            limit: config.event_limit,
        },
        Duration::from_secs(config.events_timeout_secs),
    )?);

    let api_key = config
        .gemini_api_key
        .as_deref()
        .context("GEMINI_API_KEY is required")?;
    let estimate_provider: Arc<dyn EstimateProvider> = Arc::new(GeminiProvider::new(
        &config.gemini_api_url,
        api_key,
        &config.gemini_model,
    )?);

    if config.dashboard {
        let addr: SocketAddr = config.dashboard_addr.parse()?;
        let app = dashboard::router(AppState::new(
            config.clone(),
            market_data,
            estimate_provider,
            db,
        ));
        info!("Dashboard listening on http://{}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        return Ok(());
    }

    let settings = config.scan_settings();
    info!("Scanning {} (series {})", settings.date, config.series_id);
    let scanner = Scanner::new(market_data, estimate_provider, settings);

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            println!("{}", line);
        }
    });

    let result = scanner.run(&tx).await;
    drop(tx);
    if let Err(e) = printer.await {
        warn!("Report printer ended abnormally: {}", e);
    }
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            error!("Scan failed: {:#}", e);
            return Err(e);
        }
    };

    if let Some(db) = &db {
        let id = db.record_report(&report)?;
        info!("Stored run #{}", id);
    }

    Ok(())
}
