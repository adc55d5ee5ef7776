//! Failure classification for Gemini API responses
//!
//! Distinguishes short-lived rate limits (per-minute quota, 429) from quota
//! exhaustion that will not clear for minutes or hours (daily/plan limits,
//! `RESOURCE_EXHAUSTED` outside a 429). Everything the key pool cannot act on
//! beyond counting errors is Transient or Other.

use crate::ErrorClassification;

/// Markers in a 429 body that indicate a daily or billing-plan quota rather
/// than a per-minute limit.
const LONG_QUOTA_PATTERNS: &[&str] = &["per day", "perday", "daily", "billing"];

/// Status string Google APIs use for quota and capacity exhaustion.
const RESOURCE_EXHAUSTED: &str = "resource_exhausted";

/// Classify a 429 response body as a short rate limit or long exhaustion.
fn classify_429(body: &str) -> ErrorClassification {
    let lower = body.to_lowercase();
    if LONG_QUOTA_PATTERNS.iter().any(|p| lower.contains(p)) {
        return ErrorClassification::ResourceExhausted;
    }
    ErrorClassification::RateLimit
}

/// Classify an upstream error by HTTP status and response body.
///
/// 429 dispatches on the body. Any other status whose body reports
/// `RESOURCE_EXHAUSTED` is long exhaustion. 408/5xx are Transient. Remaining
/// statuses (400, 401, 403, 404, ...) are Other.
pub fn classify_status(status: u16, body: &str) -> ErrorClassification {
    if status == 429 {
        return classify_429(body);
    }
    if body.to_lowercase().contains(RESOURCE_EXHAUSTED) {
        return ErrorClassification::ResourceExhausted;
    }
    match status {
        408 | 500..=599 => ErrorClassification::Transient,
        _ => ErrorClassification::Other,
    }
}

/// Classify a failure that produced no HTTP response.
pub fn classify_transport(err: &reqwest::Error) -> ErrorClassification {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        ErrorClassification::Transient
    } else {
        ErrorClassification::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_429_per_minute_is_rate_limit() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded for metric generate_content_requests per minute","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(classify_status(429, body), ErrorClassification::RateLimit);
    }

    #[test]
    fn classify_429_per_day_is_resource_exhausted() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded for quota metric 'GenerateRequestsPerDayPerProjectPerModel'","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            classify_status(429, body),
            ErrorClassification::ResourceExhausted
        );
    }

    #[test]
    fn classify_429_billing_is_resource_exhausted() {
        let body = "You exceeded your current quota, please check your plan and billing details.";
        assert_eq!(
            classify_status(429, body),
            ErrorClassification::ResourceExhausted
        );
    }

    #[test]
    fn classify_429_empty_body_is_rate_limit() {
        assert_eq!(classify_status(429, ""), ErrorClassification::RateLimit);
    }

    #[test]
    fn classify_429_case_insensitive() {
        assert_eq!(
            classify_status(429, "DAILY LIMIT REACHED"),
            ErrorClassification::ResourceExhausted
        );
    }

    #[test]
    fn resource_exhausted_outside_429() {
        let body = r#"{"error":{"code":503,"status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            classify_status(503, body),
            ErrorClassification::ResourceExhausted
        );
    }

    #[test]
    fn server_errors_are_transient() {
        for status in [408, 500, 502, 503, 504] {
            assert_eq!(
                classify_status(status, "unavailable"),
                ErrorClassification::Transient,
                "status {status}"
            );
        }
    }

    #[test]
    fn client_errors_are_other() {
        for status in [400, 401, 403, 404] {
            assert_eq!(
                classify_status(status, "API key not valid"),
                ErrorClassification::Other,
                "status {status}"
            );
        }
    }
}
