//! Rotation and retry settings
//!
//! Deserialized from the `[rotation]` config table. Every field has a default,
//! so an absent table yields the stock policy: 60s rate-limit cooldown, 300s
//! exhaustion cooldown, 3 attempts, 3 errors to disable a key, 1s between
//! attempts.

use serde::Deserialize;
use std::time::Duration;

/// Longest cooldown a key can be put into (seven days).
pub const MAX_COOLDOWN: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Longest delay between attempts (five minutes).
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(5 * 60);

/// Cooldown, retry and error-threshold policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RotationSettings {
    #[serde(default = "default_rate_limit_cooldown_secs")]
    pub rate_limit_cooldown_secs: u64,
    #[serde(default = "default_resource_exhausted_cooldown_secs")]
    pub resource_exhausted_cooldown_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Consecutive non-rate-limit failures that put a key in the error state
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_rate_limit_cooldown_secs() -> u64 {
    60
}

fn default_resource_exhausted_cooldown_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_error_threshold() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            rate_limit_cooldown_secs: default_rate_limit_cooldown_secs(),
            resource_exhausted_cooldown_secs: default_resource_exhausted_cooldown_secs(),
            max_attempts: default_max_attempts(),
            error_threshold: default_error_threshold(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl RotationSettings {
    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }

    pub fn resource_exhausted_cooldown(&self) -> Duration {
        Duration::from_secs(self.resource_exhausted_cooldown_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Reject settings that would make the executor or scheduler unusable.
    pub fn validate(&self) -> common::Result<()> {
        if self.max_attempts == 0 {
            return Err(common::Error::Config(
                "max_attempts must be greater than 0".into(),
            ));
        }
        if self.error_threshold == 0 {
            return Err(common::Error::Config(
                "error_threshold must be greater than 0".into(),
            ));
        }
        for (name, secs) in [
            ("rate_limit_cooldown_secs", self.rate_limit_cooldown_secs),
            (
                "resource_exhausted_cooldown_secs",
                self.resource_exhausted_cooldown_secs,
            ),
        ] {
            if secs > MAX_COOLDOWN.as_secs() {
                return Err(common::Error::Config(format!(
                    "{name} must be at most {}, got: {secs}",
                    MAX_COOLDOWN.as_secs()
                )));
            }
        }
        if self.retry_delay_ms > MAX_RETRY_DELAY.as_millis() as u64 {
            return Err(common::Error::Config(format!(
                "retry_delay_ms must be at most {}, got: {}",
                MAX_RETRY_DELAY.as_millis(),
                self.retry_delay_ms
            )));
        }
        Ok(())
    }
}

/// Split a comma-separated key list, trimming whitespace and dropping empties.
pub fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_owned)
        .collect()
}
