//! Client-side security layer: sanitization, validation, CSRF tokens,
//! sliding-window rate limiting and session idle monitoring, wired together
//! by a secure request gate.

pub mod clock;
pub mod config;
pub mod errors;
pub mod gate;
pub mod observability;
pub mod security;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::schema::GuardConfig;
pub use errors::{ErrorKind, FieldError, GateError};
pub use gate::{Payload, SecureGate, Transport, TransportResponse};
pub use session::{SessionEvent, SessionMonitor};
