//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur when building domain values from raw input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A string did not name any known variant of a domain enum.
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },
}

impl DomainError {
    pub(crate) fn invalid(field: &str, value: &str, expected: &str) -> Self {
        Self::InvalidFieldValue {
            field: field.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
