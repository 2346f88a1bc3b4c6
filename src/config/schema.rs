//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files and
//! every field has a default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Root configuration for the security gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GuardConfig {
    /// Sliding-window limits.
    pub rate_limit: RateLimitConfig,

    /// Idle timeout settings.
    pub session: SessionConfig,

    /// Anti-forgery token settings.
    pub csrf: CsrfConfig,

    /// Field validation defaults.
    pub validation: ValidationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// A single sliding-window limit.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct RateLimitRule {
    /// Maximum admitted requests inside the window. Zero denies everything.
    pub max_requests: u32,

    /// Window length in milliseconds.
    pub window_ms: u64,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Default maximum requests per window.
    pub max_requests: u32,

    /// Default window length in milliseconds.
    pub window_ms: u64,

    /// Per-operation overrides keyed by operation id.
    pub operations: BTreeMap<String, RateLimitRule>,
}

impl RateLimitConfig {
    /// Limit that applies to `operation`.
    pub fn rule_for(&self, operation: &str) -> RateLimitRule {
        self.operations
            .get(operation)
            .copied()
            .unwrap_or(RateLimitRule {
                max_requests: self.max_requests,
                window_ms: self.window_ms,
            })
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_ms: 60_000,
            operations: BTreeMap::new(),
        }
    }
}

/// Session idle tracking configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum gap since last activity before the session expires.
    pub idle_timeout_secs: u64,

    /// Interval of the periodic idle check.
    pub check_interval_secs: u64,
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            check_interval_secs: 5 * 60,
        }
    }
}

/// CSRF header configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CsrfConfig {
    /// Outbound request header carrying the live token.
    pub header_name: String,

    /// Response header through which the server rotates the token.
    pub rotation_header: String,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            header_name: "x-csrf-token".to_string(),
            rotation_header: "x-csrf-token".to_string(),
        }
    }
}

/// Field validation defaults.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Upper length bound used when a field rule sets none.
    pub max_field_length: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_field_length: 10_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
