//! Rotating API key pool for generative-model calls
//!
//! Routes every model call through a pool of interchangeable API keys so that
//! one key hitting its quota, or failing repeatedly, does not stall callers.
//! The pool selects keys round-robin, tracks per-key cooldowns and error
//! counts, caches one client handle per key, and retries failed calls on the
//! next usable key.
//!
//! Key lifecycle:
//! 1. Pool built from the configured key list → every key `Available`
//! 2. Executor selects a key round-robin and calls the model with its handle
//! 3. Rate limit → `RateLimited` for the short cooldown
//! 4. Resource exhaustion → `RateLimited` for the long cooldown
//! 5. Cooldown elapses → back to `Available` on the next scan
//! 6. Third consecutive transient failure → `Error`, out of rotation for good

pub mod cache;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod models;
pub mod pool;
pub mod settings;

pub use cache::ClientCache;
pub use error::{Error, Result};
pub use executor::Executor;
pub use models::ModelMap;
pub use pool::{KeyPool, KeySnapshot, KeyStatus, PoolStatus, SelectedKey};
pub use settings::{RotationSettings, parse_key_list};
