//! Pool and executor metrics
//!
//! Emitted through the `metrics` facade; whichever recorder the host process
//! installs (Prometheus in production) picks them up.
//!
//! - `key_pool_selections_total` (counter): label `outcome`
//! - `key_pool_transitions_total` (counter): label `to`
//! - `key_pool_calls_total` (counter): labels `purpose`, `outcome`
//! - `key_pool_call_attempts_total` (counter): label `classification`
//!   ("success" for attempts that returned a response)

/// Record one `select()` outcome: "selected", "recovered", or "exhausted".
pub fn record_selection(outcome: &'static str) {
    metrics::counter!("key_pool_selections_total", "outcome" => outcome).increment(1);
}

/// Record a key state transition into `to`.
pub fn record_transition(to: &'static str) {
    metrics::counter!("key_pool_transitions_total", "to" => to).increment(1);
}

/// Record a finished `execute()` call.
pub fn record_call(purpose: &str, outcome: &'static str) {
    metrics::counter!("key_pool_calls_total", "purpose" => purpose.to_string(), "outcome" => outcome)
        .increment(1);
}

/// Record one upstream attempt: "success" or the failure classification.
pub fn record_attempt(classification: &'static str) {
    metrics::counter!("key_pool_call_attempts_total", "classification" => classification)
        .increment(1);
}
