//! One-shot pipeline cycle for smoke-testing credentials and provider quotas
//! from a shell. Content lands in the in-process store, so the run summary
//! printed at the end is the output.

use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trend_content_engine::config::{Credentials, EngineConfig};
use trend_content_engine::pipeline::ContentPipeline;
use trend_content_engine::store::{DocumentStore, MemoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();

    let cfg = EngineConfig::load()?;
    let creds = Credentials::from_env();
    creds.validate()?;

    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let pipeline = ContentPipeline::from_config(cfg, &creds, store);

    let summary = pipeline.run_cycle().await;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
