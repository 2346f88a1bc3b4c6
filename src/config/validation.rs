//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows and timeouts > 0)
//! - Check header names are legal HTTP header names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use reqwest::header::HeaderName;

use crate::config::schema::{GuardConfig, RateLimitRule};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_rule(
        "rate_limit",
        RateLimitRule {
            max_requests: config.rate_limit.max_requests,
            window_ms: config.rate_limit.window_ms,
        },
        &mut errors,
    );
    for (operation, rule) in &config.rate_limit.operations {
        if operation.trim().is_empty() {
            errors.push(ValidationError::new(
                "rate_limit.operations",
                "operation id must not be empty",
            ));
        }
        check_rule(&format!("rate_limit.operations.{operation}"), *rule, &mut errors);
    }

    let session = &config.session;
    if session.idle_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "session.idle_timeout_secs",
            "must be greater than zero",
        ));
    }
    if session.check_interval_secs == 0 {
        errors.push(ValidationError::new(
            "session.check_interval_secs",
            "must be greater than zero",
        ));
    } else if session.check_interval_secs > session.idle_timeout_secs {
        errors.push(ValidationError::new(
            "session.check_interval_secs",
            "must not exceed session.idle_timeout_secs",
        ));
    }

    for (field, value) in [
        ("csrf.header_name", &config.csrf.header_name),
        ("csrf.rotation_header", &config.csrf.rotation_header),
    ] {
        if HeaderName::from_bytes(value.as_bytes()).is_err() {
            errors.push(ValidationError::new(field, "not a valid HTTP header name"));
        }
    }

    if config.validation.max_field_length == 0 {
        errors.push(ValidationError::new(
            "validation.max_field_length",
            "must be greater than zero",
        ));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("expected one of {}", LOG_LEVELS.join(", ")),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_rule(field: &str, rule: RateLimitRule, errors: &mut Vec<ValidationError>) {
    if rule.window_ms == 0 {
        errors.push(ValidationError::new(
            format!("{field}.window_ms"),
            "must be greater than zero",
        ));
    }
}
