//! Password strength scoring.

use serde::Serialize;

const MIN_LENGTH: usize = 8;
const VALID_SCORE: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrengthLevel {
    Weak,
    Medium,
    Strong,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordStrength {
    /// Number of satisfied criteria, 0 to 5.
    pub score: u8,
    pub strength: StrengthLevel,
    pub is_valid: bool,
    /// One hint per unmet criterion.
    pub feedback: Vec<String>,
}

/// Score a password against length, upper, lower, digit and special-character criteria.
pub fn check_password_strength(password: &str) -> PasswordStrength {
    let criteria = [
        (
            password.chars().count() >= MIN_LENGTH,
            "Use at least 8 characters",
        ),
        (
            password.chars().any(char::is_uppercase),
            "Add an uppercase letter",
        ),
        (
            password.chars().any(char::is_lowercase),
            "Add a lowercase letter",
        ),
        (
            password.chars().any(|c| c.is_ascii_digit()),
            "Add a number",
        ),
        (
            password
                .chars()
                .any(|c| !c.is_alphanumeric() && !c.is_whitespace()),
            "Add a special character",
        ),
    ];

    let score = criteria.iter().filter(|(met, _)| *met).count() as u8;
    let feedback = criteria
        .iter()
        .filter(|(met, _)| !met)
        .map(|(_, hint)| hint.to_string())
        .collect();

    let strength = match score {
        0..=2 => StrengthLevel::Weak,
        3 => StrengthLevel::Medium,
        _ => StrengthLevel::Strong,
    };

    PasswordStrength {
        score,
        strength,
        is_valid: score >= VALID_SCORE,
        feedback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weak_password() {
        let result = check_password_strength("abc");
        assert_eq!(result.score, 1);
        assert_eq!(result.strength, StrengthLevel::Weak);
        assert!(!result.is_valid);
        assert_eq!(result.feedback.len(), 4);
    }

    #[test]
    fn test_medium_password_is_valid() {
        let result = check_password_strength("Abcdefgh");
        assert_eq!(result.score, 3);
        assert_eq!(result.strength, StrengthLevel::Medium);
        assert!(result.is_valid);
    }

    #[test]
    fn test_strong_password() {
        let result = check_password_strength("Abcdefg1!");
        assert_eq!(result.score, 5);
        assert_eq!(result.strength, StrengthLevel::Strong);
        assert!(result.feedback.is_empty());

        let result = check_password_strength("abcdefg1!");
        assert_eq!(result.strength, StrengthLevel::Strong);
    }

    #[test]
    fn test_empty_password() {
        let result = check_password_strength("");
        assert_eq!(result.score, 0);
        assert!(!result.is_valid);
    }
}
