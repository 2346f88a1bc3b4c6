//! Metrics collection.
//!
//! # Metrics
//! - `gate_requests_total` (counter): gated operations by operation, outcome
//! - `rate_limited_total` (counter): rejected admissions by operation
//! - `validation_failures_total` (counter): field failures by kind
//! - `session_expired_total` (counter): idle teardowns
//! - `csrf_tokens_issued_total` (counter): tokens issued or adopted
//!
//! No recorder is installed here; the host application chooses an exporter.

use crate::errors::ErrorKind;

pub fn record_gate_outcome(operation: &str, outcome: &'static str) {
    metrics::counter!(
        "gate_requests_total",
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_rate_limited(operation: &str) {
    metrics::counter!("rate_limited_total", "operation" => operation.to_string()).increment(1);
}

pub fn record_validation_failure(kind: ErrorKind) {
    metrics::counter!("validation_failures_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_session_expired() {
    metrics::counter!("session_expired_total").increment(1);
}

pub fn record_token_issued(source: &'static str) {
    metrics::counter!("csrf_tokens_issued_total", "source" => source).increment(1);
}
