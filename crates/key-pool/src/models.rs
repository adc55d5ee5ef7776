//! Purpose to model mapping

use std::collections::HashMap;

pub const ORCHESTRATOR: &str = "orchestrator";
pub const VISION: &str = "vision";
pub const FALLBACK: &str = "fallback";
pub const CREATIVE: &str = "creative";
/// High-capability purpose
pub const PRO: &str = "pro";

const FLASH_MODEL: &str = "gemini-3-flash-preview";
const PRO_MODEL: &str = "gemini-3-pro-preview";

/// Fixed mapping from purpose tags to backend model identifiers.
///
/// Unknown purposes resolve to the `fallback` entry. Built once at startup
/// and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ModelMap {
    models: HashMap<String, String>,
}

impl Default for ModelMap {
    fn default() -> Self {
        let models = [
            (ORCHESTRATOR, FLASH_MODEL),
            (VISION, FLASH_MODEL),
            (FALLBACK, FLASH_MODEL),
            (CREATIVE, FLASH_MODEL),
            (PRO, PRO_MODEL),
        ]
        .into_iter()
        .map(|(p, m)| (p.to_string(), m.to_string()))
        .collect();
        Self { models }
    }
}

impl ModelMap {
    /// Stock mapping with entries replaced or added from `overrides`.
    pub fn with_overrides(overrides: HashMap<String, String>) -> Self {
        let mut map = Self::default();
        map.models.extend(overrides);
        map
    }

    /// Model identifier for `purpose`, falling back to the `fallback` entry.
    pub fn resolve(&self, purpose: &str) -> &str {
        self.models
            .get(purpose)
            .or_else(|| self.models.get(FALLBACK))
            .map(String::as_str)
            .unwrap_or(FLASH_MODEL)
    }
}
