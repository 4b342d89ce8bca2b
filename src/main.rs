//! PharmaSentinel daemon: scheduled pipeline plus the HTTP trigger surface
//!
//! Configuration comes from the environment:
//! - `NEWSAPI_KEY` (required): NewsAPI credential
//! - `NEWSAPI_BASE_URL`: defaults to `https://newsapi.org`
//! - `OPENFDA_BASE_URL`: defaults to `https://api.fda.gov`
//! - `OPENAI_API_KEY`: optional; without it the pipeline runs fully
//!   deterministic
//! - `OPENAI_BASE_URL`: defaults to `https://api.openai.com`
//! - `SENTINEL_HTTP_ADDR`: trigger-surface bind address
//! - `SENTINEL_RUN_INTERVAL_SECS`: scheduled-run interval
//!
//! Pass `--once` to execute a single run and exit instead of serving.

use anyhow::Context;
use pharma_sentinel::feeds::{NewsApiSearch, OpenFdaFeed};
use pharma_sentinel::llm::HttpLlmClient;
use pharma_sentinel::{SentinelBuilder, SentinelConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pharma_sentinel=info,sentinel=info")),
        )
        .init();

    let once = std::env::args().any(|a| a == "--once");

    let mut config = SentinelConfig::default();
    if let Ok(addr) = std::env::var("SENTINEL_HTTP_ADDR") {
        config = config.http_addr(addr.parse().context("invalid SENTINEL_HTTP_ADDR")?);
    }
    if let Ok(secs) = std::env::var("SENTINEL_RUN_INTERVAL_SECS") {
        let secs: u64 = secs.parse().context("invalid SENTINEL_RUN_INTERVAL_SECS")?;
        config = config.run_interval(Duration::from_secs(secs));
    }

    let newsapi_key =
        std::env::var("NEWSAPI_KEY").context("NEWSAPI_KEY is required for the news agent")?;
    let shortage_feed = OpenFdaFeed::new(env_or("OPENFDA_BASE_URL", "https://api.fda.gov"))?;
    let news_search = NewsApiSearch::new(env_or("NEWSAPI_BASE_URL", "https://newsapi.org"), newsapi_key);

    let mut builder = SentinelBuilder::new()
        .config(config)
        .shortage_feed(Arc::new(shortage_feed))
        .news_search(Arc::new(news_search?));

    match std::env::var("OPENAI_API_KEY") {
        Ok(key) => {
            let llm = HttpLlmClient::new(env_or("OPENAI_BASE_URL", "https://api.openai.com"))?
                .with_api_key(key);
            builder = builder.llm(Arc::new(llm));
        }
        Err(_) => {
            info!("No OPENAI_API_KEY set, running with deterministic analysis only");
        }
    }

    let sentinel = Arc::new(builder.build().await?);

    if once {
        let report = sentinel.run_once().await?;
        info!(
            run_id = %report.run_id,
            alerts = report.alerts_created,
            escalated = report.alerts_escalated,
            orders = report.orders_suggested,
            "Single run complete"
        );
        return Ok(());
    }

    let handle = sentinel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            handle.shutdown();
        }
    });

    sentinel.serve().await?;
    Ok(())
}
