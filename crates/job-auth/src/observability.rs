//! Metrics for key refresh and token handling.
//!
//! All metrics follow Prometheus naming conventions:
//! - `auth_` prefix
//! - `_total` suffix for counters
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `status`: `success`, `error`
//! - `source`: `local_file`, `remote_fetch`, or a custom source name
//! - `kind`: `access`, `proxy`
//!
//! Recording is a no-op until the host process installs a recorder.

use metrics::{counter, gauge};

/// Record one refresher fetch attempt.
///
/// Metric: `auth_key_refresh_total`
/// Labels: `source`, `status`
pub fn record_key_refresh(source: &'static str, status: &'static str) {
    counter!("auth_key_refresh_total", "source" => source, "status" => status).increment(1);
}

/// Consecutive refresher failures since the last success.
///
/// Metric: `auth_key_refresh_consecutive_failures`
pub fn set_refresh_consecutive_failures(count: u32) {
    gauge!("auth_key_refresh_consecutive_failures").set(f64::from(count));
}

/// Record a token verification outcome.
///
/// Metric: `auth_token_verifications_total`
/// Labels: `kind`, `status`
pub fn record_token_verification(kind: &'static str, status: &'static str) {
    counter!("auth_token_verifications_total", "kind" => kind, "status" => status).increment(1);
}

/// Record an issued token.
///
/// Metric: `auth_tokens_issued_total`
pub fn record_token_issued() {
    counter!("auth_tokens_issued_total").increment(1);
}
