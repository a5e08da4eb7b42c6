//! # Trend Content Engine: Binary Entrypoint
//! Boots the Axum HTTP server, wiring config, credentials, pipeline state,
//! metrics, and middleware.
//!
//! See `README.md` for quickstart and endpoint list.

use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trend_content_engine::api::{create_router, AppState};
use trend_content_engine::config::{Credentials, EngineConfig};
use trend_content_engine::metrics::Metrics;
use trend_content_engine::pipeline::ContentPipeline;
use trend_content_engine::store::{DocumentStore, MemoryStore};

/// Compact tracing to stdout, filter taken from `RUST_LOG` when set.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,trend_content_engine=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    // This enables ENGINE_CONFIG_PATH / ENGINE_SIMILARITY_THRESHOLD and the
    // provider API keys from .env so config.rs can pick them up.
    let _ = dotenvy::dotenv();

    init_tracing();

    let cfg = EngineConfig::load()?;
    let creds = Credentials::from_env();
    // Missing required credentials abort startup, before any provider call.
    creds.validate()?;

    let metrics = Metrics::init(&cfg);

    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let addr = cfg.server.addr();
    let pipeline = Arc::new(ContentPipeline::from_config(cfg, &creds, store));

    let state = AppState { pipeline };
    let router = create_router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "trend-content-engine listening");
    axum::serve(listener, router).await?;

    Ok(())
}
