//! Field classes and per-field constraints.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Content class of an input field. Selects the sanitizer/validator pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Email,
    Phone,
    Name,
    AlphaNumeric,
    FreeText,
    EducationalContent,
    Url,
    FileName,
    SqlSensitive,
}

impl FieldType {
    pub const ALL: [FieldType; 9] = [
        FieldType::Email,
        FieldType::Phone,
        FieldType::Name,
        FieldType::AlphaNumeric,
        FieldType::FreeText,
        FieldType::EducationalContent,
        FieldType::Url,
        FieldType::FileName,
        FieldType::SqlSensitive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Name => "name",
            FieldType::AlphaNumeric => "alpha_numeric",
            FieldType::FreeText => "free_text",
            FieldType::EducationalContent => "educational_content",
            FieldType::Url => "url",
            FieldType::FileName => "file_name",
            FieldType::SqlSensitive => "sql_sensitive",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        FieldType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("unknown field type: {s}"))
    }
}

/// Presence and length constraints for one field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    pub required: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

/// Field class plus constraints; one entry of a form's rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field_type: FieldType,
    #[serde(flatten)]
    pub constraints: Constraints,
}

impl FieldRule {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            constraints: Constraints::default(),
        }
    }

    pub fn required(mut self) -> Self {
        self.constraints.required = true;
        self
    }

    pub fn min_length(mut self, min: usize) -> Self {
        self.constraints.min_length = Some(min);
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.constraints.max_length = Some(max);
        self
    }

    /// Fill in an upper bound if the rule has none.
    pub fn with_default_max(mut self, max: usize) -> Self {
        if self.constraints.max_length.is_none() {
            self.constraints.max_length = Some(max);
        }
        self
    }
}
