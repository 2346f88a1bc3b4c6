//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound operation payload:
//!     → validation.rs (per-field checks, uses sanitize.rs)
//!     → rate_limit.rs (sliding window per operation)
//!     → csrf.rs (attach the live anti-forgery token)
//!     → Pass to transport
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input
//! - Advisory only: the server still validates and parameterizes queries

pub mod csrf;
pub mod field;
pub mod password;
pub mod rate_limit;
pub mod sanitize;
pub mod validation;

pub use csrf::{CsrfManager, CsrfToken};
pub use field::{Constraints, FieldRule, FieldType};
pub use password::{check_password_strength, PasswordStrength, StrengthLevel};
pub use rate_limit::RateLimiter;
pub use sanitize::sanitize;
pub use validation::{validate, validate_form, FormValidation, ValidationResult};
