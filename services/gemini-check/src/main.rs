//! Gemini key pool smoke check
//!
//! Loads the pool configuration, builds the key pool and executor, sends one
//! orchestrator call, and logs the outcome together with the pool status
//! snapshot. Exits non-zero if the call fails.

mod config;

use anyhow::{Context, Result};
use inference::{GeminiClientFactory, GenerationOptions, Payload};
use key_pool::{Executor, ModelMap, models};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Prompt whose only valid answer is "OK".
const SMOKE_PROMPT: &str = "Reply with just: OK";

/// Build the executor from loaded configuration.
fn build_executor(config: &Config) -> Result<Executor> {
    let factory = GeminiClientFactory::new(
        config.gemini.base_url.clone(),
        Duration::from_secs(config.gemini.timeout_secs),
    )
    .context("failed to build HTTP client")?;
    Ok(Executor::new(
        config.key_list(),
        Arc::new(factory),
        ModelMap::with_overrides(config.models.clone()),
        config.rotation.clone(),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs, filter from LOG_LEVEL or RUST_LOG
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting gemini-check");

    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    let config = if config_path.exists() {
        info!(path = %config_path.display(), "loading configuration");
        Config::load(&config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        warn!(path = %config_path.display(), "config file not found, using defaults");
        Config::parse("").context("invalid configuration")?
    };

    info!(
        keys = config.key_list().len(),
        base_url = %config.gemini.base_url,
        max_attempts = config.rotation.max_attempts,
        "configuration loaded"
    );

    let executor = build_executor(&config)?;
    let result = executor
        .execute(
            models::ORCHESTRATOR,
            &Payload::text(SMOKE_PROMPT),
            &GenerationOptions::default(),
        )
        .await;

    let status = executor.status().await;
    info!(
        pool = %serde_json::to_string(&status).context("failed to serialize pool status")?,
        "pool status"
    );

    match result {
        Ok(text) => {
            info!(response = %text.trim(), "smoke call succeeded");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "smoke call failed");
            anyhow::bail!("smoke call failed: {e}")
        }
    }
}
