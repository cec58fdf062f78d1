//! Credibility: the confidence an observation's producer places in it.
//!
//! Credibility is the first (most significant) key of the observation rank,
//! so it must be a well-ordered number. NaN and values outside [0, 1] are
//! rejected at construction.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A validated confidence value in `[0.0, 1.0]`.
///
/// # Examples
///
/// ```
/// use observa::Credibility;
///
/// let c = Credibility::new(0.8).unwrap();
/// assert_eq!(c.value(), 0.8);
/// assert!(Credibility::new(1.2).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Credibility(f64);

impl Credibility {
    /// Minimum valid credibility.
    pub const MIN_VALUE: f64 = 0.0;

    /// Maximum valid credibility.
    pub const MAX_VALUE: f64 = 1.0;

    /// Creates a credibility with validation.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::CredibilityOutOfRange` if the value is NaN or
    /// not in [0.0, 1.0].
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if value.is_nan() || !(Self::MIN_VALUE..=Self::MAX_VALUE).contains(&value) {
            return Err(ValidationError::CredibilityOutOfRange { value });
        }
        // -0.0 folds to 0.0 so equality and ordering agree.
        Ok(Self(value + 0.0))
    }

    /// Full credibility (1.0).
    #[must_use]
    pub const fn certain() -> Self {
        Self(Self::MAX_VALUE)
    }

    /// Zero credibility.
    #[must_use]
    pub const fn none() -> Self {
        Self(Self::MIN_VALUE)
    }

    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }
}

impl Eq for Credibility {}

impl PartialOrd for Credibility {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Credibility {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl TryFrom<f64> for Credibility {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Credibility> for f64 {
    fn from(c: Credibility) -> Self {
        c.0
    }
}

impl fmt::Display for Credibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_bounds() {
        assert_eq!(Credibility::new(0.0).unwrap(), Credibility::none());
        assert_eq!(Credibility::new(1.0).unwrap(), Credibility::certain());
    }

    #[test]
    fn test_out_of_range() {
        assert!(matches!(
            Credibility::new(-0.1),
            Err(ValidationError::CredibilityOutOfRange { .. })
        ));
        assert!(Credibility::new(1.0001).is_err());
        assert!(Credibility::new(f64::NAN).is_err());
    }

    #[test]
    fn test_ordering() {
        let low = Credibility::new(0.3).unwrap();
        let high = Credibility::new(0.8).unwrap();
        assert!(low < high);
        assert_eq!(low.max(high), high);
    }

    #[test]
    fn test_serde_validates() {
        let c: Credibility = serde_json::from_str("0.5").unwrap();
        assert_eq!(c.value(), 0.5);
        assert!(serde_json::from_str::<Credibility>("2.0").is_err());
        assert_eq!(serde_json::to_string(&c).unwrap(), "0.5");
    }
}
