//! Error types for observa.
//!
//! All errors are strongly typed using thiserror. Normalization failures
//! propagate immediately: a malformed observation cannot be ranked or merged.

use thiserror::Error;

/// Structural problems found while reading an observation or filter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Action '{action}' is not one of 'set' or 'delete'")]
    InvalidAction {
        action: String,
    },

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Credibility value {value} is out of range [0.0, 1.0]")]
    CredibilityOutOfRange {
        value: f64,
    },

    #[error("Field '{field}' must be an object, found {found}")]
    NotAnObject {
        field: String,
        found: String,
    },

    #[error("Field '{field}' must be {expected}, found {found}")]
    WrongType {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("Field '{field}' is not a valid entity reference: {reason}")]
    InvalidReference {
        field: String,
        reason: String,
    },

    #[error("Invalid filter: {reason}")]
    InvalidFilter {
        reason: String,
    },
}

/// Top-level error type for observa.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObservaError {
    /// A date-like field could not be coerced and no fallback was configured.
    #[error("Malformed date in '{field}': {input}")]
    MalformedDate {
        field: String,
        input: String,
    },

    /// A structural invariant of an observation is violated.
    #[error("Invalid observation: {0}")]
    InvalidObservation(#[from] ValidationError),

    /// A configuration document could not be read.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        message: String,
    },
}

impl ObservaError {
    /// Creates a malformed date error.
    #[must_use]
    pub fn malformed_date(field: impl Into<String>, input: impl Into<String>) -> Self {
        Self::MalformedDate {
            field: field.into(),
            input: input.into(),
        }
    }

    /// Returns true if this is a date coercion failure.
    #[must_use]
    pub const fn is_malformed_date(&self) -> bool {
        matches!(self, Self::MalformedDate { .. })
    }

    /// Returns true if this is a structural validation failure.
    #[must_use]
    pub const fn is_invalid_observation(&self) -> bool {
        matches!(self, Self::InvalidObservation(_))
    }

    /// Returns the underlying validation error, if any.
    #[must_use]
    pub const fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::InvalidObservation(e) => Some(e),
            Self::MalformedDate { .. } | Self::InvalidConfig { .. } => None,
        }
    }
}

/// Result type alias for observa operations.
pub type ObservaResult<T> = Result<T, ObservaError>;
