//! Error taxonomy for the security layer.
//!
//! Validation problems are recoverable and reported per field.
//! `SessionExpired` is a forced-logout signal. `RateLimited` may be retried
//! after its reset time. CSRF failures are fatal for the current operation.
//!
//! No variant carries raw or sanitized payload contents, only field names
//! and kinds, so errors are always safe to log.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Flat error kind, shared by field results and gate failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingRequiredField,
    LengthOutOfRange,
    FormatInvalid,
    MaliciousPatternDetected,
    SessionExpired,
    RateLimited,
    MissingCsrfToken,
    TokenMismatch,
    TransportError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MissingRequiredField => "missing_required_field",
            ErrorKind::LengthOutOfRange => "length_out_of_range",
            ErrorKind::FormatInvalid => "format_invalid",
            ErrorKind::MaliciousPatternDetected => "malicious_pattern_detected",
            ErrorKind::SessionExpired => "session_expired",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::MissingCsrfToken => "missing_csrf_token",
            ErrorKind::TokenMismatch => "token_mismatch",
            ErrorKind::TransportError => "transport_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validation failure for a single named field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Failure of a gated operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("session expired")]
    SessionExpired,

    #[error("rate limit exceeded for {operation}, capacity frees at {reset_at_ms}")]
    RateLimited { operation: String, reset_at_ms: u64 },

    #[error("validation failed for {} field(s)", .0.len())]
    ValidationFailed(Vec<FieldError>),

    #[error("no live CSRF token")]
    MissingCsrfToken,

    #[error("CSRF token mismatch")]
    TokenMismatch,

    #[error("transport error (status {status:?}): {message}")]
    Transport { status: Option<u16>, message: String },
}

impl GateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GateError::SessionExpired => ErrorKind::SessionExpired,
            GateError::RateLimited { .. } => ErrorKind::RateLimited,
            // A form can fail several ways at once; the first field decides.
            GateError::ValidationFailed(errors) => errors
                .first()
                .map(|e| e.kind)
                .unwrap_or(ErrorKind::FormatInvalid),
            GateError::MissingCsrfToken => ErrorKind::MissingCsrfToken,
            GateError::TokenMismatch => ErrorKind::TokenMismatch,
            GateError::Transport { .. } => ErrorKind::TransportError,
        }
    }

    /// True when the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GateError::RateLimited { .. })
    }

    /// True when the UI must treat this as a forced logout.
    pub fn forces_logout(&self) -> bool {
        matches!(self, GateError::SessionExpired)
    }
}
