//! Error types for pool and executor operations

/// Failures that cross the key pool's boundary.
///
/// Rate limits and transient upstream errors never appear here: the executor
/// absorbs them into key state and retries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(
        "pool exhausted: {total} keys, {rate_limited} rate limited, {errored} in error state"
    )]
    PoolExhausted {
        total: usize,
        rate_limited: usize,
        errored: usize,
    },

    #[error("call failed after {attempts} attempts: {last_error}")]
    CallFailedAfterRetries { attempts: u32, last_error: String },

    #[error("no API keys configured")]
    NoCredentials,
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
