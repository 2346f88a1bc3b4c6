//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Configure log level from config, overridable via `RUST_LOG`
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Payload values are never logged; only operation ids, field names and kinds

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter directive for a configured level.
pub fn default_directive(level: &str) -> String {
    format!("secure_gate={},guard_cli={}", level, level)
}

/// Install the global subscriber. Returns false if one was already set.
pub fn init_logging(level: &str) -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive(level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_ok()
}
