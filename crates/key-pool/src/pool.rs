//! Key state machine and round-robin selection
//!
//! The pool holds one entry per API key in a fixed rotation order, plus a
//! shared cursor. Selection and every state transition run under a single
//! mutex; neither the network call nor the retry delay happens while it is
//! held.
//!
//! Cooldown recovery is lazy: a RateLimited key whose cooldown has elapsed
//! becomes Available the next time a scan reaches it.

use std::collections::BTreeMap;
use std::time::Duration;

use common::Secret;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::metrics;
use crate::settings::MAX_COOLDOWN;

/// Runtime status of a pool key.
///
/// Transitions:
/// - Available → RateLimited (rate limit or resource exhaustion)
/// - RateLimited → Available (cooldown elapsed, on the next scan)
/// - Available → Error (error threshold reached)
/// - Error → (none; terminal for the life of the pool)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Available,
    RateLimited { until: Instant },
    Error,
}

impl KeyStatus {
    /// Status label for status snapshots and logging.
    pub fn label(&self) -> &'static str {
        match self {
            KeyStatus::Available => "available",
            KeyStatus::RateLimited { .. } => "rate_limited",
            KeyStatus::Error => "error",
        }
    }
}

/// Mutable per-key state, guarded by the pool mutex.
#[derive(Debug)]
struct KeyState {
    status: KeyStatus,
    last_used: Option<Instant>,
    error_count: u32,
}

impl KeyState {
    fn new() -> Self {
        Self {
            status: KeyStatus::Available,
            last_used: None,
            error_count: 0,
        }
    }
}

#[derive(Debug)]
struct PoolState {
    keys: Vec<KeyState>,
    cursor: usize,
}

/// A key chosen by [`KeyPool::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedKey {
    pub index: usize,
    pub label: String,
}

/// Point-in-time view of one key. Never carries the secret.
#[derive(Debug, Clone, Serialize)]
pub struct KeySnapshot {
    pub label: String,
    pub fingerprint: String,
    pub status: &'static str,
    pub error_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_secs_ago: Option<u64>,
}

/// Point-in-time view of the whole pool, for monitoring.
///
/// `credentials` is keyed by the 1-based display index (`key_1` is index 1).
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    /// "healthy" (every key selectable), "degraded" (some), "unhealthy" (none)
    pub status: &'static str,
    pub keys_total: usize,
    pub keys_available: usize,
    pub keys_rate_limited: usize,
    pub keys_error: usize,
    pub credentials: BTreeMap<usize, KeySnapshot>,
}

/// Display label for the key at `index`.
fn key_label(index: usize) -> String {
    format!("key_{}", index + 1)
}

/// Pool of interchangeable API keys with round-robin selection.
///
/// The keys themselves are immutable after construction and live outside the
/// mutex; only status, counters and the cursor are shared mutable state.
pub struct KeyPool {
    api_keys: Vec<Secret<String>>,
    fingerprints: Vec<String>,
    state: Mutex<PoolState>,
    error_threshold: u32,
}

impl KeyPool {
    /// Create a pool over `api_keys` in rotation order. Every key starts
    /// Available and the cursor starts at the first key.
    ///
    /// An empty list yields an unusable pool (see [`KeyPool::is_usable`]).
    pub fn new(api_keys: Vec<String>, error_threshold: u32) -> Self {
        let api_keys: Vec<Secret<String>> = api_keys.into_iter().map(Secret::new).collect();
        let fingerprints = api_keys.iter().map(Secret::fingerprint).collect();
        let keys = api_keys.iter().map(|_| KeyState::new()).collect();

        if api_keys.is_empty() {
            warn!("key pool created with no API keys; every call will fail");
        } else {
            info!(keys = api_keys.len(), error_threshold, "key pool initialized");
        }

        Self {
            api_keys,
            fingerprints,
            state: Mutex::new(PoolState { keys, cursor: 0 }),
            error_threshold,
        }
    }

    /// Number of keys in the pool.
    pub fn len(&self) -> usize {
        self.api_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.api_keys.is_empty()
    }

    /// False when the pool was built without keys.
    pub fn is_usable(&self) -> bool {
        !self.api_keys.is_empty()
    }

    /// The secret for the key at `index`.
    pub fn api_key(&self, index: usize) -> Option<&Secret<String>> {
        self.api_keys.get(index)
    }

    /// Select the next usable key, scanning at most one full rotation.
    ///
    /// Each scan step advances the cursor by one, whether or not the key it
    /// examines is chosen. Available keys are returned immediately. A
    /// RateLimited key whose cooldown has elapsed is flipped to Available,
    /// its error count reset, and returned. Keys still cooling down and keys
    /// in the error state are skipped.
    ///
    /// Never waits for a cooldown: returns `PoolExhausted` if the scan finds
    /// nothing, or `NoCredentials` for an empty pool.
    pub async fn select(&self) -> Result<SelectedKey> {
        let mut state = self.state.lock().await;
        let n = state.keys.len();
        if n == 0 {
            return Err(Error::NoCredentials);
        }

        let now = Instant::now();
        for _ in 0..n {
            let index = state.cursor;
            state.cursor = (index + 1) % n;

            let key = &mut state.keys[index];
            match key.status {
                KeyStatus::Available => {
                    metrics::record_selection("selected");
                    return Ok(self.selected(index));
                }
                KeyStatus::RateLimited { until } if now >= until => {
                    key.status = KeyStatus::Available;
                    key.error_count = 0;
                    info!(key = %key_label(index), "cooldown elapsed, key available again");
                    metrics::record_transition("available");
                    metrics::record_selection("recovered");
                    return Ok(self.selected(index));
                }
                KeyStatus::RateLimited { .. } | KeyStatus::Error => continue,
            }
        }

        let (rate_limited, errored) = state.keys.iter().fold((0, 0), |(r, e), k| match k.status {
            KeyStatus::RateLimited { .. } => (r + 1, e),
            KeyStatus::Error => (r, e + 1),
            KeyStatus::Available => (r, e),
        });
        metrics::record_selection("exhausted");
        debug!(total = n, rate_limited, errored, "no selectable key");
        Err(Error::PoolExhausted {
            total: n,
            rate_limited,
            errored,
        })
    }

    fn selected(&self, index: usize) -> SelectedKey {
        SelectedKey {
            index,
            label: key_label(index),
        }
    }

    /// Put a key into cooldown for `cooldown` and count the failure.
    ///
    /// A key already in the error state keeps that state; only its count moves.
    /// Cooldowns longer than [`MAX_COOLDOWN`] are capped.
    pub async fn mark_rate_limited(&self, index: usize, cooldown: Duration) {
        let mut state = self.state.lock().await;
        let Some(key) = state.keys.get_mut(index) else {
            warn!(index, "rate limit reported for unknown key");
            return;
        };

        key.error_count += 1;
        if key.status == KeyStatus::Error {
            debug!(key = %key_label(index), "rate limit on key in error state, status unchanged");
            return;
        }

        let cooldown = cooldown.min(MAX_COOLDOWN);
        let now = Instant::now();
        let until = now.checked_add(cooldown).unwrap_or(now);
        key.status = KeyStatus::RateLimited { until };
        info!(
            key = %key_label(index),
            cooldown_secs = cooldown.as_secs(),
            error_count = key.error_count,
            "key entering cooldown"
        );
        metrics::record_transition("rate_limited");
    }

    /// Count a non-rate-limit failure. Reaching the error threshold moves the
    /// key to the terminal error state.
    pub async fn mark_error(&self, index: usize) {
        let mut state = self.state.lock().await;
        let Some(key) = state.keys.get_mut(index) else {
            warn!(index, "error reported for unknown key");
            return;
        };

        key.error_count += 1;
        if key.error_count >= self.error_threshold && key.status != KeyStatus::Error {
            key.status = KeyStatus::Error;
            warn!(
                key = %key_label(index),
                fingerprint = %self.fingerprints[index],
                error_count = key.error_count,
                "key disabled after repeated errors"
            );
            metrics::record_transition("error");
        } else {
            debug!(key = %key_label(index), error_count = key.error_count, "key error counted");
        }
    }

    /// Record a successful call: stamp `last_used` and clear the error count.
    pub async fn mark_success(&self, index: usize) {
        let mut state = self.state.lock().await;
        let Some(key) = state.keys.get_mut(index) else {
            warn!(index, "success reported for unknown key");
            return;
        };
        key.last_used = Some(Instant::now());
        key.error_count = 0;
    }

    /// Snapshot of every key's status and error count.
    pub async fn status(&self) -> PoolStatus {
        let state = self.state.lock().await;
        let now = Instant::now();

        let mut keys = BTreeMap::new();
        let mut available = 0usize;
        let mut rate_limited = 0usize;
        let mut errored = 0usize;
        let mut selectable = 0usize;

        for (index, key) in state.keys.iter().enumerate() {
            let cooldown_remaining_secs = match key.status {
                KeyStatus::Available => {
                    available += 1;
                    selectable += 1;
                    None
                }
                KeyStatus::RateLimited { until } => {
                    rate_limited += 1;
                    if now >= until {
                        selectable += 1;
                    }
                    Some(until.saturating_duration_since(now).as_secs())
                }
                KeyStatus::Error => {
                    errored += 1;
                    None
                }
            };

            keys.insert(
                index + 1,
                KeySnapshot {
                    label: key_label(index),
                    fingerprint: self.fingerprints[index].clone(),
                    status: key.status.label(),
                    error_count: key.error_count,
                    cooldown_remaining_secs,
                    last_used_secs_ago: key.last_used.map(|t| now.duration_since(t).as_secs()),
                },
            );
        }

        let total = state.keys.len();
        let status = if total > 0 && selectable == total {
            "healthy"
        } else if selectable > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        PoolStatus {
            status,
            keys_total: total,
            keys_available: available,
            keys_rate_limited: rate_limited,
            keys_error: errored,
            credentials: keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> KeyPool {
        let keys = (0..n).map(|i| format!("test-key-{i}")).collect();
        KeyPool::new(keys, 3)
    }

    async fn status_of(pool: &KeyPool, index: usize) -> KeySnapshot {
        pool.status().await.credentials[&(index + 1)].clone()
    }

    #[tokio::test]
    async fn round_robin_visits_each_key_once_in_order() {
        let pool = pool(4);
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(pool.select().await.unwrap().index);
        }
        assert_eq!(seen, vec![0, 1, 2, 3]);

        // Wraps back to the start
        assert_eq!(pool.select().await.unwrap().index, 0);
    }

    #[tokio::test]
    async fn selected_key_carries_display_label() {
        let pool = pool(2);
        let s = pool.select().await.unwrap();
        assert_eq!(s.label, "key_1");
        assert_eq!(pool.api_key(s.index).unwrap().expose(), "test-key-0");
    }

    #[tokio::test]
    async fn cursor_advances_past_skipped_keys() {
        let pool = pool(3);
        for _ in 0..3 {
            pool.mark_error(1).await;
        }

        assert_eq!(pool.select().await.unwrap().index, 0);
        // Scan examines key 1 (error, skipped) then returns key 2
        assert_eq!(pool.select().await.unwrap().index, 2);
        assert_eq!(pool.select().await.unwrap().index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rotation_scenario_with_rate_limits_and_exhaustion() {
        let pool = pool(3);

        // Call 1: A selected, rate limited for 60s
        let a = pool.select().await.unwrap();
        assert_eq!(a.index, 0);
        pool.mark_rate_limited(a.index, Duration::from_secs(60)).await;

        // Call 2: B selected, succeeds
        let b = pool.select().await.unwrap();
        assert_eq!(b.index, 1);
        pool.mark_success(b.index).await;

        // Call 3: C selected, resource exhausted for 300s
        let c = pool.select().await.unwrap();
        assert_eq!(c.index, 2);
        pool.mark_rate_limited(c.index, Duration::from_secs(300)).await;

        // Call 4: cursor wraps to A, still cooling down, B is returned
        tokio::time::advance(Duration::from_secs(30)).await;
        let next = pool.select().await.unwrap();
        assert_eq!(next.index, 1);

        let snap_a = status_of(&pool, 0).await;
        assert_eq!(snap_a.status, "rate_limited");
        assert_eq!(snap_a.error_count, 1);
        let snap_b = status_of(&pool, 1).await;
        assert_eq!(snap_b.status, "available");
        assert_eq!(snap_b.error_count, 0);
        assert_eq!(status_of(&pool, 2).await.status, "rate_limited");
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_key_returns_exactly_at_cooldown_end() {
        let pool = pool(1);
        let cooldown = Duration::from_secs(60);
        pool.mark_rate_limited(0, cooldown).await;

        tokio::time::advance(cooldown - Duration::from_millis(1)).await;
        assert!(matches!(
            pool.select().await,
            Err(Error::PoolExhausted { .. })
        ));

        tokio::time::advance(Duration::from_millis(1)).await;
        let s = pool.select().await.unwrap();
        assert_eq!(s.index, 0);

        let snap = status_of(&pool, 0).await;
        assert_eq!(snap.status, "available");
        assert_eq!(snap.error_count, 0, "recovery resets the error count");
    }

    #[tokio::test]
    async fn third_consecutive_error_is_terminal() {
        let pool = pool(2);
        pool.mark_error(0).await;
        pool.mark_error(0).await;
        assert_eq!(status_of(&pool, 0).await.status, "available");

        pool.mark_error(0).await;
        let snap = status_of(&pool, 0).await;
        assert_eq!(snap.status, "error");
        assert_eq!(snap.error_count, 3);

        for _ in 0..10 {
            assert_eq!(pool.select().await.unwrap().index, 1);
        }
    }

    #[tokio::test]
    async fn success_between_errors_resets_the_count() {
        let pool = pool(1);
        pool.mark_error(0).await;
        pool.mark_error(0).await;
        pool.mark_success(0).await;
        pool.mark_error(0).await;

        let snap = status_of(&pool, 0).await;
        assert_eq!(snap.status, "available");
        assert_eq!(snap.error_count, 1);
    }

    #[tokio::test]
    async fn mark_success_resets_count_and_stamps_last_used() {
        let pool = pool(1);
        assert!(status_of(&pool, 0).await.last_used_secs_ago.is_none());
        pool.mark_error(0).await;
        pool.mark_success(0).await;

        let snap = status_of(&pool, 0).await;
        assert_eq!(snap.error_count, 0);
        assert!(snap.last_used_secs_ago.is_some());
    }

    #[tokio::test]
    async fn custom_error_threshold() {
        let pool = KeyPool::new(vec!["k".into()], 1);
        pool.mark_error(0).await;
        assert_eq!(status_of(&pool, 0).await.status, "error");
    }

    #[tokio::test(start_paused = true)]
    async fn error_state_survives_rate_limit_report() {
        let pool = pool(1);
        for _ in 0..3 {
            pool.mark_error(0).await;
        }
        pool.mark_rate_limited(0, Duration::from_secs(1)).await;
        tokio::time::advance(Duration::from_secs(5)).await;

        let snap = status_of(&pool, 0).await;
        assert_eq!(snap.status, "error");
        assert_eq!(snap.error_count, 4);
        assert!(pool.select().await.is_err());
    }

    #[tokio::test]
    async fn exhausted_reports_counts() {
        let pool = pool(3);
        pool.mark_rate_limited(0, Duration::from_secs(60)).await;
        pool.mark_rate_limited(1, Duration::from_secs(300)).await;
        for _ in 0..3 {
            pool.mark_error(2).await;
        }

        match pool.select().await {
            Err(Error::PoolExhausted {
                total,
                rate_limited,
                errored,
            }) => {
                assert_eq!(total, 3);
                assert_eq!(rate_limited, 2);
                assert_eq!(errored, 1);
            }
            other => panic!("expected PoolExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_pool_is_unusable() {
        let pool = KeyPool::new(vec![], 3);
        assert!(!pool.is_usable());
        assert!(pool.is_empty());
        assert!(matches!(pool.select().await, Err(Error::NoCredentials)));

        let status = pool.status().await;
        assert_eq!(status.status, "unhealthy");
        assert_eq!(status.keys_total, 0);
    }

    #[tokio::test]
    async fn unknown_index_is_ignored() {
        let pool = pool(1);
        pool.mark_error(7).await;
        pool.mark_rate_limited(7, Duration::from_secs(60)).await;
        pool.mark_success(7).await;
        assert_eq!(status_of(&pool, 0).await.error_count, 0);
    }

    #[tokio::test]
    async fn status_health_levels() {
        let pool = pool(2);
        assert_eq!(pool.status().await.status, "healthy");

        pool.mark_rate_limited(0, Duration::from_secs(60)).await;
        assert_eq!(pool.status().await.status, "degraded");

        for _ in 0..3 {
            pool.mark_error(1).await;
        }
        let status = pool.status().await;
        assert_eq!(status.status, "unhealthy");
        assert_eq!(status.keys_rate_limited, 1);
        assert_eq!(status.keys_error, 1);
        assert_eq!(status.keys_available, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn status_shows_cooldown_remaining() {
        let pool = pool(1);
        pool.mark_rate_limited(0, Duration::from_secs(300)).await;
        tokio::time::advance(Duration::from_secs(100)).await;

        let snap = status_of(&pool, 0).await;
        assert_eq!(snap.cooldown_remaining_secs, Some(200));
    }

    #[tokio::test]
    async fn status_serializes_without_secrets() {
        let pool = KeyPool::new(vec!["AIzaSy-secret-one".into(), "AIzaSy-secret-two".into()], 3);
        let json = serde_json::to_value(pool.status().await).unwrap();

        assert_eq!(json["credentials"]["1"]["label"], "key_1");
        assert_eq!(json["credentials"]["2"]["status"], "available");
        assert_eq!(json["credentials"]["2"]["error_count"], 0);
        assert!(json["credentials"]["1"].get("cooldown_remaining_secs").is_none());

        let rendered = json.to_string();
        assert!(!rendered.contains("AIzaSy"), "secret leaked: {rendered}");
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_cooldown_is_capped() {
        let pool = pool(1);
        pool.mark_rate_limited(0, Duration::MAX).await;

        let snap = status_of(&pool, 0).await;
        assert_eq!(snap.status, "rate_limited");
        assert_eq!(snap.cooldown_remaining_secs, Some(MAX_COOLDOWN.as_secs()));

        tokio::time::advance(MAX_COOLDOWN).await;
        assert_eq!(pool.select().await.unwrap().index, 0);
    }

    #[tokio::test]
    async fn concurrent_selects_stay_round_robin() {
        let pool = std::sync::Arc::new(pool(4));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move { pool.select().await.unwrap().index }));
        }

        let mut counts = [0usize; 4];
        for h in handles {
            counts[h.await.unwrap()] += 1;
        }
        assert_eq!(counts, [2, 2, 2, 2]);
    }
}
