//! # Validation Errors
//!
//! Structured errors for domain primitive construction, built with
//! `thiserror`. Each variant carries the rejected input or the offending
//! field so an operator can diagnose a bad request without guesswork.

use thiserror::Error;

/// Validation errors for domain newtypes and record fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Identifier is not exactly 20 characters from `[A-Za-z0-9]`.
    #[error("invalid identifier: \"{0}\" (expected 20 characters from [A-Za-z0-9])")]
    InvalidIdentifier(String),

    /// Base URL could not be parsed or is not an http(s) origin/path.
    #[error("invalid base URL: \"{value}\" ({reason})")]
    InvalidBaseUrl {
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Scanned content is not a verification URL carrying an identifier.
    #[error("invalid verification URL: \"{0}\"")]
    InvalidVerificationUrl(String),

    /// A required field is missing or blank.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// A field exceeds its maximum length.
    #[error("{field} must not exceed {max} characters")]
    FieldTooLong {
        /// Field name.
        field: &'static str,
        /// Maximum length in characters.
        max: usize,
    },

    /// Visibility status string is not `active` or `inactive`.
    #[error("invalid status: \"{0}\" (expected \"active\" or \"inactive\")")]
    InvalidStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_identifier_display_includes_input() {
        let err = ValidationError::InvalidIdentifier("abc".into());
        assert!(err.to_string().contains("\"abc\""));
    }

    #[test]
    fn field_too_long_display() {
        let err = ValidationError::FieldTooLong {
            field: "legalization_no",
            max: 50,
        };
        assert_eq!(
            err.to_string(),
            "legalization_no must not exceed 50 characters"
        );
    }

    #[test]
    fn missing_field_display() {
        assert_eq!(
            ValidationError::MissingField("document_owner").to_string(),
            "document_owner is required"
        );
    }
}
