//! Date coercion and date/value bounds.
//!
//! observa distinguishes two clocks:
//! - **Observation date**: when the fact became true in the domain.
//! - **System date**: when the observation entered the system.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ObservaError, ObservaResult};

/// Coerces a JSON value to a UTC timestamp.
///
/// Accepted inputs: RFC 3339 strings, `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS`
/// (read as UTC), and integer milliseconds since the Unix epoch.
///
/// When coercion fails, `fallback` is returned if present; otherwise a
/// `MalformedDate` error naming `field` is raised.
///
/// # Errors
///
/// Returns `ObservaError::MalformedDate` if the input is not date-like and
/// no fallback was supplied.
///
/// # Examples
///
/// ```
/// use observa::time::coerce_date;
///
/// let d = coerce_date("observationDate", &serde_json::json!("2025-01-01"), None).unwrap();
/// assert_eq!(d.to_rfc3339(), "2025-01-01T00:00:00+00:00");
/// ```
pub fn coerce_date(
    field: &str,
    raw: &serde_json::Value,
    fallback: Option<DateTime<Utc>>,
) -> ObservaResult<DateTime<Utc>> {
    if let Some(parsed) = parse_date(raw) {
        return Ok(parsed);
    }
    match fallback {
        Some(default) => {
            tracing::warn!(field, input = %raw, fallback = %default, "malformed date replaced by fallback");
            Ok(default)
        }
        None => Err(ObservaError::malformed_date(field, raw.to_string())),
    }
}

fn parse_date(raw: &serde_json::Value) -> Option<DateTime<Utc>> {
    match raw {
        serde_json::Value::String(s) => parse_date_str(s.trim()),
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Minimum and maximum of a set of comparable values.
///
/// Both ends are `None` when no value was defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T> Default for Bounds<T> {
    fn default() -> Self {
        Self { min: None, max: None }
    }
}

impl<T: PartialOrd + Copy> Bounds<T> {
    /// Computes bounds over the defined values of an iterator.
    pub fn of<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<T>>,
    {
        values.into_iter().flatten().fold(Self::default(), |acc, v| Self {
            min: Some(match acc.min {
                Some(m) if m <= v => m,
                _ => v,
            }),
            max: Some(match acc.max {
                Some(m) if m >= v => m,
                _ => v,
            }),
        })
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.min.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_coerce_plain_date() {
        let d = coerce_date("d", &json!("2024-01-01"), None).unwrap();
        assert_eq!(d, utc(2024, 1, 1));
    }

    #[test]
    fn test_coerce_rfc3339_with_offset() {
        let d = coerce_date("d", &json!("2024-01-01T02:00:00+02:00"), None).unwrap();
        assert_eq!(d, utc(2024, 1, 1));
    }

    #[test]
    fn test_coerce_naive_datetime() {
        let d = coerce_date("d", &json!("2024-01-01T00:00:00"), None).unwrap();
        assert_eq!(d, utc(2024, 1, 1));
    }

    #[test]
    fn test_coerce_epoch_millis() {
        let d = coerce_date("d", &json!(1_704_067_200_000_i64), None).unwrap();
        assert_eq!(d, utc(2024, 1, 1));
    }

    #[test]
    fn test_malformed_date_errors() {
        let err = coerce_date("observationDate", &json!("yesterday"), None).unwrap_err();
        assert!(err.is_malformed_date());
        assert!(format!("{err}").contains("observationDate"));
    }

    #[test]
    fn test_malformed_date_uses_fallback() {
        let fallback = utc(2000, 1, 1);
        let d = coerce_date("d", &json!({"not": "a date"}), Some(fallback)).unwrap();
        assert_eq!(d, fallback);
    }

    #[test]
    fn test_bounds_of() {
        let b = Bounds::of([Some(0.5), None, Some(0.3), Some(0.8)]);
        assert_eq!(b.min, Some(0.3));
        assert_eq!(b.max, Some(0.8));
    }

    #[test]
    fn test_bounds_empty() {
        let b: Bounds<f64> = Bounds::of([None, None]);
        assert!(b.is_empty());
        assert_eq!(b.max, None);
    }
}
