//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! API keys are loaded from the GOOGLE_API_KEY env var (comma-separated) or
//! from `api_keys_file`, never stored in the TOML directly to avoid leaking
//! secrets.

use common::Secret;
use key_pool::{RotationSettings, parse_key_list};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Env var holding one or more comma-separated API keys.
const API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub rotation: RotationSettings,
    /// Purpose → model overrides on top of the stock mapping
    #[serde(default)]
    pub models: HashMap<String, String>,
    /// Raw comma-separated key list, resolved from env or file
    #[serde(skip)]
    pub api_keys: Option<Secret<String>>,
}

/// Gemini endpoint settings
#[derive(Debug, Deserialize)]
pub struct GeminiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Path to a file containing API keys (alternative to GOOGLE_API_KEY)
    #[serde(default)]
    pub api_keys_file: Option<PathBuf>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            api_keys_file: None,
        }
    }
}

fn default_base_url() -> String {
    inference::DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    120
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate TOML contents, then resolve API keys.
    ///
    /// API key resolution order:
    /// 1. GOOGLE_API_KEY env var
    /// 2. api_keys_file path from config (commas or newlines between keys)
    ///
    /// No keys from either source is a startup error.
    pub fn parse(contents: &str) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;

        if !config.gemini.base_url.starts_with("http://")
            && !config.gemini.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.gemini.base_url
            )));
        }

        if config.gemini.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        config.rotation.validate()?;

        if let Ok(keys) = std::env::var(API_KEY_ENV) {
            config.api_keys = Some(Secret::new(keys));
        } else if let Some(ref key_file) = config.gemini.api_keys_file {
            let keys = std::fs::read_to_string(key_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read api_keys_file {}: {e}",
                    key_file.display()
                ))
            })?;
            config.api_keys = Some(Secret::new(keys.replace('\n', ",")));
        }

        if config.key_list().is_empty() {
            return Err(common::Error::NoCredentials(format!(
                "set {API_KEY_ENV} or gemini.api_keys_file"
            )));
        }

        Ok(config)
    }

    /// API keys in rotation order.
    pub fn key_list(&self) -> Vec<String> {
        self.api_keys
            .as_ref()
            .map(|raw| parse_key_list(raw.expose()))
            .unwrap_or_default()
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("gemini-check.toml")
    }
}
