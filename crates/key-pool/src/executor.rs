//! Call executor: select, invoke, classify, update, retry
//!
//! The single entry point collaborators use. Each attempt selects a key,
//! fetches its cached handle, and calls the model. Failures are folded into
//! key state by classification:
//!
//! - RateLimit → cooldown for `rate_limit_cooldown_secs`
//! - ResourceExhausted → cooldown for `resource_exhausted_cooldown_secs`
//! - Transient / Other → error count (error state at the threshold)
//!
//! Attempts are separated by a fixed delay. Only `NoCredentials` and
//! `CallFailedAfterRetries` reach the caller.

use std::sync::Arc;

use inference::{CallError, ClientFactory, ErrorClassification, GenerationOptions, Payload};
use tracing::{Instrument, error, info_span, warn};
use uuid::Uuid;

use crate::cache::ClientCache;
use crate::error::{Error, Result};
use crate::metrics;
use crate::models::ModelMap;
use crate::pool::{KeyPool, PoolStatus, SelectedKey};
use crate::settings::RotationSettings;

/// Purpose-parameterized model calls over a shared key pool.
///
/// Built once at startup and shared (`Arc<Executor>`) with every collaborator.
/// Rotation state is process-wide: a rate limit hit by one caller is seen by
/// all others.
pub struct Executor {
    pool: Arc<KeyPool>,
    cache: ClientCache,
    models: ModelMap,
    settings: RotationSettings,
}

impl Executor {
    /// Build the executor and its key pool. The pool's error threshold comes
    /// from `settings`.
    pub fn new(
        api_keys: Vec<String>,
        factory: Arc<dyn ClientFactory>,
        models: ModelMap,
        settings: RotationSettings,
    ) -> Self {
        Self {
            pool: Arc::new(KeyPool::new(api_keys, settings.error_threshold)),
            cache: ClientCache::new(factory),
            models,
            settings,
        }
    }

    /// The underlying key pool.
    pub fn pool(&self) -> &Arc<KeyPool> {
        &self.pool
    }

    /// Snapshot of every key, for monitoring.
    pub async fn status(&self) -> PoolStatus {
        self.pool.status().await
    }

    /// Run `payload` against the model mapped to `purpose`, rotating keys and
    /// retrying up to `max_attempts` times.
    ///
    /// Returns the response text, `NoCredentials` immediately for an empty
    /// pool, or `CallFailedAfterRetries` once attempts run out.
    pub async fn execute(
        &self,
        purpose: &str,
        payload: &Payload,
        options: &GenerationOptions,
    ) -> Result<String> {
        let model = self.models.resolve(purpose);
        let span = info_span!("execute", call_id = %Uuid::new_v4(), purpose, model);
        self.run(purpose, model, payload, options)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        purpose: &str,
        model: &str,
        payload: &Payload,
        options: &GenerationOptions,
    ) -> Result<String> {
        if !self.pool.is_usable() {
            warn!("no API keys configured, call refused");
            metrics::record_call(purpose, "no_credentials");
            return Err(Error::NoCredentials);
        }

        let max_attempts = self.settings.max_attempts;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.settings.retry_delay()).await;
            }

            let selected = match self.pool.select().await {
                Ok(s) => s,
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "no key selectable");
                    last_error = e.to_string();
                    continue;
                }
            };

            let outcome = match self.pool.api_key(selected.index) {
                Some(api_key) => match self.cache.get(selected.index, api_key).await {
                    Ok(client) => client.generate(model, payload, options).await,
                    Err(e) => Err(e),
                },
                None => Err(CallError::new(
                    ErrorClassification::Other,
                    "selected key has no secret",
                )),
            };

            match outcome {
                Ok(text) => {
                    self.pool.mark_success(selected.index).await;
                    metrics::record_attempt("success");
                    metrics::record_call(purpose, "success");
                    return Ok(text);
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts,
                        key = %selected.label,
                        classification = e.classification.label(),
                        error = %e.message,
                        "attempt failed"
                    );
                    self.record_failure(&selected, &e).await;
                    last_error = format!("{}: {e}", selected.label);
                }
            }
        }

        error!(attempts = max_attempts, error = %last_error, "call failed after retries");
        metrics::record_call(purpose, "failed");
        Err(Error::CallFailedAfterRetries {
            attempts: max_attempts,
            last_error,
        })
    }

    /// Fold a classified failure into the selected key's state.
    async fn record_failure(&self, selected: &SelectedKey, err: &CallError) {
        metrics::record_attempt(err.classification.label());
        match err.classification {
            ErrorClassification::RateLimit => {
                self.pool
                    .mark_rate_limited(selected.index, self.settings.rate_limit_cooldown())
                    .await
            }
            ErrorClassification::ResourceExhausted => {
                self.pool
                    .mark_rate_limited(
                        selected.index,
                        self.settings.resource_exhausted_cooldown(),
                    )
                    .await
            }
            ErrorClassification::Transient | ErrorClassification::Other => {
                self.pool.mark_error(selected.index).await
            }
        }
    }
}
