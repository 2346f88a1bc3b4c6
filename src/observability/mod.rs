//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters)
//!
//! Consumers:
//!     → Log aggregation (stderr)
//!     → Whatever metrics recorder the host installs
//! ```

pub mod logging;
pub mod metrics;
