//! Field and form validation.
//!
//! # Algorithm (per field)
//! ```text
//! raw
//!     → required / empty check
//!     → sanitize (sanitize.rs)
//!     → length bounds on the sanitized value
//!     → structural pattern for the field type
//!     → script / SQL-injection detectors
//!     → sanitized value
//! ```
//!
//! Forms evaluate every field; all failures are reported in one pass.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use url::Url;

use crate::errors::{ErrorKind, FieldError};
use crate::security::field::{Constraints, FieldRule, FieldType};
use crate::security::sanitize::sanitize;

const EMAIL_MAX_CHARS: usize = 254;
const PHONE_MIN_DIGITS: usize = 7;
const PHONE_MAX_DIGITS: usize = 15;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern is valid")
}

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"^[a-z0-9._%+-]+@[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}$")
});
static PHONE: LazyLock<Regex> = LazyLock::new(|| compile(r"^\+?[0-9() -]+$"));
static ALPHA_NUMERIC: LazyLock<Regex> = LazyLock::new(|| compile(r"^[A-Za-z0-9 ]+$"));
static SCRIPT_INJECTION: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)(?:<\s*/?\s*script\b|javascript\s*:|vbscript\s*:|data\s*:\s*text/html|<[^>]*\bon[a-z]+\s*=)",
    )
});
static SQL_INJECTION: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)(?:\bunion\b\s+(?:all\s+)?\bselect\b|\bdrop\s+(?:table|database|schema)\b|\binsert\s+into\b|\bdelete\s+from\b|\bexec(?:ute)?\s*\(|'\s*or\s+'?[0-9a-z]+'?\s*=\s*'?[0-9a-z]+|;\s*--)",
    )
});

/// Outcome of validating one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub sanitized_value: Option<String>,
    pub error: Option<ErrorKind>,
    pub message: Option<String>,
}

impl ValidationResult {
    fn ok(value: String) -> Self {
        Self {
            is_valid: true,
            sanitized_value: Some(value),
            error: None,
            message: None,
        }
    }

    fn fail(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            sanitized_value: None,
            error: Some(kind),
            message: Some(message.into()),
        }
    }

    fn into_field_error(self, field: &str) -> Option<FieldError> {
        let kind = self.error?;
        Some(FieldError::new(
            field,
            kind,
            self.message.unwrap_or_else(|| kind.to_string()),
        ))
    }
}

/// Outcome of validating a whole form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormValidation {
    pub is_valid: bool,
    pub errors: BTreeMap<String, FieldError>,
    pub sanitized_data: BTreeMap<String, String>,
}

impl FormValidation {
    pub fn error_list(&self) -> Vec<FieldError> {
        self.errors.values().cloned().collect()
    }
}

/// True if the text contains script-bearing markup or script URLs.
pub fn contains_script(text: &str) -> bool {
    SCRIPT_INJECTION.is_match(text)
}

/// True if the text looks like an SQL injection attempt.
pub fn contains_sql_injection(text: &str) -> bool {
    SQL_INJECTION.is_match(text)
}

/// Validate a single raw value.
pub fn validate(raw: &str, field_type: FieldType, constraints: &Constraints) -> ValidationResult {
    if raw.trim().is_empty() {
        return if constraints.required {
            ValidationResult::fail(ErrorKind::MissingRequiredField, "This field is required")
        } else {
            ValidationResult::ok(String::new())
        };
    }

    let sanitized = sanitize(raw, field_type);

    if sanitized.is_empty() {
        if contains_script(raw) {
            return ValidationResult::fail(
                ErrorKind::MaliciousPatternDetected,
                "Input contains disallowed content",
            );
        }
        if constraints.required {
            return ValidationResult::fail(
                ErrorKind::FormatInvalid,
                format!("Not a valid {}", describe(field_type)),
            );
        }
        return ValidationResult::ok(sanitized);
    }

    let length = sanitized.chars().count();
    if let Some(min) = constraints.min_length {
        if length < min {
            return ValidationResult::fail(
                ErrorKind::LengthOutOfRange,
                format!("Must be at least {min} characters"),
            );
        }
    }
    if let Some(max) = constraints.max_length {
        if length > max {
            return ValidationResult::fail(
                ErrorKind::LengthOutOfRange,
                format!("Must be at most {max} characters"),
            );
        }
    }

    if !matches_format(&sanitized, field_type) {
        return ValidationResult::fail(
            ErrorKind::FormatInvalid,
            format!("Not a valid {}", describe(field_type)),
        );
    }

    if contains_script(&sanitized) || contains_sql_injection(&sanitized) {
        return ValidationResult::fail(
            ErrorKind::MaliciousPatternDetected,
            "Input contains disallowed content",
        );
    }

    ValidationResult::ok(sanitized)
}

/// Validate every field of a form without short-circuiting.
///
/// Fields with no rule are sanitized as free text; rules with no matching
/// field are validated against an empty value.
pub fn validate_form(
    fields: &BTreeMap<String, String>,
    rules: &BTreeMap<String, FieldRule>,
) -> FormValidation {
    let mut result = FormValidation {
        is_valid: true,
        ..Default::default()
    };

    let names = fields.keys().chain(rules.keys().filter(|k| !fields.contains_key(*k)));
    for name in names {
        let raw = fields.get(name).map(String::as_str).unwrap_or_default();
        let rule = rules
            .get(name)
            .copied()
            .unwrap_or_else(|| FieldRule::new(FieldType::FreeText));

        let outcome = validate(raw, rule.field_type, &rule.constraints);
        match outcome.sanitized_value.clone() {
            Some(value) if outcome.is_valid => {
                result.sanitized_data.insert(name.clone(), value);
            }
            _ => {
                result.is_valid = false;
                if let Some(error) = outcome.into_field_error(name) {
                    tracing::debug!(field = %name, kind = %error.kind, "field rejected");
                    result.errors.insert(name.clone(), error);
                }
            }
        }
    }

    result
}

fn matches_format(value: &str, field_type: FieldType) -> bool {
    match field_type {
        FieldType::Email => value.chars().count() <= EMAIL_MAX_CHARS && EMAIL.is_match(value),
        FieldType::Phone => {
            let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
            PHONE.is_match(value) && (PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&digits)
        }
        FieldType::Name => value.chars().any(char::is_alphabetic),
        FieldType::AlphaNumeric => ALPHA_NUMERIC.is_match(value),
        FieldType::Url => Url::parse(value)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false),
        FieldType::FileName => value.chars().any(|c| c != '.'),
        FieldType::FreeText | FieldType::EducationalContent | FieldType::SqlSensitive => true,
    }
}

fn describe(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Email => "email address",
        FieldType::Phone => "phone number",
        FieldType::Name => "name",
        FieldType::AlphaNumeric => "alphanumeric value",
        FieldType::FreeText | FieldType::EducationalContent => "text",
        FieldType::Url => "http(s) URL",
        FieldType::FileName => "file name",
        FieldType::SqlSensitive => "value",
    }
}
