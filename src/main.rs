mod analytics;
mod api;
mod catalog;
mod collector;
mod config;
mod db;
mod error;
mod fetcher;
mod scheduler;
mod types;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::analytics::Analytics;
use crate::api::routes::{router, ApiState};
use crate::collector::Collector;
use crate::config::Config;
use crate::db::PriceStore;
use crate::error::Result;
use crate::fetcher::MarketClient;
use crate::scheduler::Scheduler;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    // `tracker collect` runs a single pass and exits; no argument serves.
    let one_shot = std::env::args().nth(1).as_deref() == Some("collect");

    if let Err(e) = run(cfg, one_shot).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config, one_shot: bool) -> Result<()> {
    // --- Database setup ---
    let store = PriceStore::open(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Collection pipeline ---
    let client = Arc::new(MarketClient::new(&cfg)?);
    let collector = Arc::new(Collector::new(client, store.clone()));
    let scheduler = Scheduler::new(collector, &cfg);

    info!(
        source = %cfg.source,
        url = %cfg.market_api_url,
        interval_ms = cfg.request_interval.as_millis() as u64,
        max_attempts = cfg.max_attempts,
        "Marketplace client configured",
    );

    if one_shot {
        let summary = scheduler.collect_once().await?;
        info!("One-shot collection finished: {summary:?}");
        return Ok(());
    }

    tokio::spawn(Arc::clone(&scheduler).run());

    // --- HTTP API server ---
    let api_state = ApiState {
        store: store.clone(),
        analytics: Analytics::new(store, &cfg),
        scheduler,
        default_source: cfg.source,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down; an interrupted pass leaves unvisited items at their previous prices");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
