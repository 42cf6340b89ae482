//! # persona-crawler
//!
//! Batch entry point. Reads `emails.txt`, `accounts.txt`, and `tokens.txt`
//! from the working directory, runs the enrichment engine, and writes
//! `hit.txt`, `crawler.log`, and `crawler.db` back. There are no flags;
//! optional overrides come from `crawler.toml`.

use anyhow::{Context, Result};
use persona_crawler::{
    install_signal_handler, ConfigBuilder, Engine, Shutdown, WebDriverLoginDriver,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .compact()
        .init();

    tracing::info!("persona-crawler v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = ConfigBuilder::new()
        .build()
        .context("failed to build configuration")?;
    let shutdown_pause = config.shutdown_pause;

    let shutdown = Arc::new(Shutdown::new());
    install_signal_handler(Arc::clone(&shutdown));

    let driver = Arc::new(WebDriverLoginDriver::new(config.webdriver_url.clone()));
    let engine = Engine::new(config, driver, Arc::clone(&shutdown))
        .await
        .context("initialization failed")?;

    engine.run().await.context("engine run failed")?;

    // Drain window before exit: lets stragglers (log consumer, fsyncs)
    // settle, and gives an operator who hit Ctrl-C a moment to read the
    // final state.
    tracing::info!("Pausing {:?} before exit...", shutdown_pause);
    tokio::time::sleep(shutdown_pause).await;

    Ok(())
}
