//! Normalizer: turns raw observation input into the canonical shape.
//!
//! Raw input arrives as JSON mappings that may use shorthand keys, embed
//! whole entities, and carry dates as strings or epoch millis. Every raw
//! mapping passes through here exactly once, at the input boundary:
//!
//! 1. shorthand keys are rewritten through [`FIELD_ALIASES`];
//! 2. `object`, `instrument`, `agent` and `observationGroup` collapse to
//!    references;
//! 3. `observationDate` and `systemDate` are coerced to timestamps.
//!
//! Typed [`Observation`] values are canonical by construction; they only
//! need [`normalize_observation`], which validates and copies.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as Json};

use crate::credibility::Credibility;
use crate::entity::EntityRef;
use crate::error::{ObservaResult, ValidationError};
use crate::observation::{Action, Observation, ObservationGroup, ObservationId, PartialObservation};
use crate::time::coerce_date;
use crate::util::json_kind;
use crate::value::Value;

/// Canonical field names and the shorthand keys accepted for them.
pub const FIELD_ALIASES: &[(&str, &[&str])] = &[
    ("propertyID", &["p"]),
    ("value", &["v"]),
    ("observationDate", &["d", "od"]),
    ("object", &["o", "obj"]),
    ("observationAbout", &["oa", "about"]),
    ("instrument", &["i", "inst"]),
    ("agent", &["a"]),
    ("credibility", &["c"]),
    ("systemDate", &["sd"]),
    ("action", &["act"]),
    ("position", &["pos"]),
];

/// Returns the canonical name for a key; unknown keys pass through.
#[must_use]
pub fn canonical_key(key: &str) -> &str {
    FIELD_ALIASES
        .iter()
        .find(|(_, shorthands)| shorthands.contains(&key))
        .map_or(key, |(canonical, _)| *canonical)
}

/// Rewrites shorthand keys to canonical names.
///
/// When a mapping carries both a shorthand and its canonical key, the
/// canonical key wins.
#[must_use]
pub fn harmonize_keys(raw: &Map<String, Json>) -> Map<String, Json> {
    let mut out = Map::with_capacity(raw.len());
    for (key, value) in raw {
        let canonical = canonical_key(key);
        if canonical == key {
            out.insert(key.clone(), value.clone());
        } else {
            out.entry(canonical.to_string()).or_insert_with(|| value.clone());
        }
    }
    out
}

/// Reads raw observation mappings.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    date_fallback: Option<DateTime<Utc>>,
}

impl Normalizer {
    /// Creates a strict normalizer: malformed dates are errors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Substitutes `fallback` for malformed dates instead of failing.
    #[must_use]
    pub fn with_date_fallback(mut self, fallback: DateTime<Utc>) -> Self {
        self.date_fallback = Some(fallback);
        self
    }

    #[must_use]
    pub const fn date_fallback(&self) -> Option<DateTime<Utc>> {
        self.date_fallback
    }

    /// Normalizes one raw mapping. `null` yields `None`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedDate` for uncoercible dates (without fallback) and
    /// `InvalidObservation` for structural problems.
    ///
    /// # Examples
    ///
    /// ```
    /// use observa::Normalizer;
    ///
    /// let partial = Normalizer::new()
    ///     .normalize(&serde_json::json!({"p": "name", "v": "Widget", "c": 0.5}))
    ///     .unwrap()
    ///     .unwrap();
    /// assert_eq!(partial.property_id.as_deref(), Some("name"));
    /// ```
    pub fn normalize(&self, raw: &Json) -> ObservaResult<Option<PartialObservation>> {
        match raw {
            Json::Null => Ok(None),
            Json::Object(map) => self.read(&harmonize_keys(map)).map(Some),
            other => Err(ValidationError::NotAnObject {
                field: "observation".to_string(),
                found: json_kind(other).to_string(),
            }
            .into()),
        }
    }

    /// Normalizes `null`, a single mapping, or an array of mappings.
    ///
    /// # Errors
    ///
    /// Fails on the first element that fails to normalize.
    pub fn normalize_all(&self, raw: &Json) -> ObservaResult<Vec<PartialObservation>> {
        match raw {
            Json::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(partial) = self.normalize(item)? {
                        out.push(partial);
                    }
                }
                Ok(out)
            }
            other => Ok(self.normalize(other)?.into_iter().collect()),
        }
    }

    fn read(&self, map: &Map<String, Json>) -> ObservaResult<PartialObservation> {
        let mut partial = PartialObservation::default();

        for (key, raw) in map {
            if raw.is_null() {
                continue;
            }
            match key.as_str() {
                "@id" | "id" => partial.id = Some(ObservationId::from_string(json_text(raw))),
                "@type" => {}
                "action" => partial.action = Some(read_action(raw)?),
                "object" => partial.object = Some(EntityRef::from_json(key, raw)?),
                "instrument" => partial.instrument = Some(EntityRef::from_json(key, raw)?),
                "agent" => partial.agent = Some(EntityRef::from_json(key, raw)?),
                "observationGroup" => partial.observation_group = Some(read_group(raw)?),
                "propertyID" => partial.property_id = Some(read_str(key, raw)?.to_string()),
                "value" => partial.value = Some(Value::from_json(raw)),
                "observationDate" => {
                    partial.observation_date = Some(coerce_date(key, raw, self.date_fallback)?);
                }
                "systemDate" => partial.system_date = Some(coerce_date(key, raw, self.date_fallback)?),
                "position" => {
                    partial.position = Some(raw.as_u64().ok_or_else(|| wrong_type(key, "a non-negative integer", raw))?);
                }
                "credibility" => {
                    let value = raw.as_f64().ok_or_else(|| wrong_type(key, "a number", raw))?;
                    partial.credibility = Some(Credibility::new(value)?);
                }
                "source" => partial.source = Some(json_text(raw)),
                _ => {
                    partial.extra.insert(key.clone(), raw.clone());
                }
            }
        }

        Ok(partial)
    }
}

/// Validates a typed observation and returns a copy of it.
///
/// # Errors
///
/// Returns `ValidationError::MissingField` if the property id is empty.
pub fn normalize_observation(observation: &Observation) -> ObservaResult<Observation> {
    if observation.property_id.is_empty() {
        return Err(ValidationError::MissingField {
            field: "propertyID".to_string(),
        }
        .into());
    }
    Ok(observation.clone())
}

fn read_action(raw: &Json) -> Result<Action, ValidationError> {
    match raw.as_str() {
        Some(s) => s.parse(),
        None => Err(ValidationError::InvalidAction {
            action: raw.to_string(),
        }),
    }
}

fn read_group(raw: &Json) -> Result<ObservationGroup, ValidationError> {
    match raw {
        Json::String(id) => Ok(ObservationGroup::with_id(id.clone())),
        other => EntityRef::from_json("observationGroup", other).map(ObservationGroup::from),
    }
}

fn read_str<'a>(field: &str, raw: &'a Json) -> Result<&'a str, ValidationError> {
    raw.as_str().ok_or_else(|| wrong_type(field, "a string", raw))
}

fn json_text(raw: &Json) -> String {
    raw.as_str().map_or_else(|| raw.to_string(), str::to_string)
}

fn wrong_type(field: &str, expected: &'static str, raw: &Json) -> ValidationError {
    ValidationError::WrongType {
        field: field.to_string(),
        expected,
        found: json_kind(raw).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::error::ObservaError;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_canonical_key() {
        assert_eq!(canonical_key("p"), "propertyID");
        assert_eq!(canonical_key("od"), "observationDate");
        assert_eq!(canonical_key("obj"), "object");
        assert_eq!(canonical_key("about"), "observationAbout");
        assert_eq!(canonical_key("name"), "name");
        assert_eq!(canonical_key("propertyID"), "propertyID");
    }

    #[test]
    fn test_harmonize_canonical_wins() {
        let raw = json!({"p": "short", "propertyID": "long", "x": 1});
        let out = harmonize_keys(raw.as_object().unwrap());
        assert_eq!(out["propertyID"], "long");
        assert_eq!(out["x"], 1);
        assert!(!out.contains_key("p"));
    }

    #[test]
    fn test_normalize_full_example() {
        let raw = json!({
            "@type": "Observation",
            "@id": "obs1",
            "p": "key1",
            "v": "value1",
            "d": "2025-01-01",
            "o": {"@type": "Thing", "@id": "object1", "name": "full payload"},
            "inst": {"@type": "Thing", "@id": "instrument1"},
            "a": {"@type": "Thing", "@id": "agent1"},
            "c": 0.5,
            "sd": "2025-01-01T00:00:00.000Z",
            "observationGroup": "observationGroup",
            "act": "set",
            "pos": 3,
            "notes": "kept"
        });

        let p = Normalizer::new().normalize(&raw).unwrap().unwrap();
        assert_eq!(p.id, Some(ObservationId::from_string("obs1")));
        assert_eq!(p.property_id.as_deref(), Some("key1"));
        assert_eq!(p.value, Some(Value::from("value1")));
        assert_eq!(p.observation_date, Some(utc(2025, 1, 1)));
        assert_eq!(p.system_date, Some(utc(2025, 1, 1)));
        assert_eq!(p.object, Some(EntityRef::new("Thing", "object1")));
        assert_eq!(p.instrument, Some(EntityRef::new("Thing", "instrument1")));
        assert_eq!(p.agent, Some(EntityRef::new("Thing", "agent1")));
        assert_eq!(p.credibility.map(Credibility::value), Some(0.5));
        assert_eq!(p.observation_group, Some(ObservationGroup::with_id("observationGroup")));
        assert_eq!(p.action, Some(Action::Set));
        assert_eq!(p.position, Some(3));
        assert_eq!(p.extra.get("notes"), Some(&json!("kept")));
    }

    #[test]
    fn test_normalize_null_is_none() {
        assert!(Normalizer::new().normalize(&Json::Null).unwrap().is_none());
        assert!(Normalizer::new().normalize_all(&Json::Null).unwrap().is_empty());
    }

    #[test]
    fn test_normalize_all_array() {
        let raw = json!([{"p": "a"}, null, {"p": "b"}]);
        let out = Normalizer::new().normalize_all(&raw).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].property_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_normalize_does_not_mutate_input() {
        let raw = json!({"p": "name", "o": {"@type": "Thing", "@id": "t1", "name": "x"}});
        let before = raw.clone();
        let _ = Normalizer::new().normalize(&raw).unwrap();
        assert_eq!(raw, before);
    }

    #[test]
    fn test_malformed_date_fails_fast() {
        let err = Normalizer::new()
            .normalize(&json!({"p": "name", "d": "not a date"}))
            .unwrap_err();
        assert!(err.is_malformed_date());
    }

    #[test]
    fn test_malformed_date_with_fallback() {
        let fallback = utc(1970, 1, 2);
        let p = Normalizer::new()
            .with_date_fallback(fallback)
            .normalize(&json!({"p": "name", "d": "not a date"}))
            .unwrap()
            .unwrap();
        assert_eq!(p.observation_date, Some(fallback));
    }

    #[test]
    fn test_invalid_action() {
        let err = Normalizer::new()
            .normalize(&json!({"p": "name", "action": "upsert"}))
            .unwrap_err();
        assert_eq!(
            err,
            ObservaError::InvalidObservation(ValidationError::InvalidAction {
                action: "upsert".to_string()
            })
        );
    }

    #[test]
    fn test_credibility_out_of_range() {
        let err = Normalizer::new()
            .normalize(&json!({"p": "name", "c": 3}))
            .unwrap_err();
        assert!(matches!(
            err.validation(),
            Some(ValidationError::CredibilityOutOfRange { .. })
        ));
    }

    #[test]
    fn test_wrong_type() {
        let err = Normalizer::new().normalize(&json!({"p": 12})).unwrap_err();
        assert!(matches!(
            err.validation(),
            Some(ValidationError::WrongType { field, .. }) if field == "propertyID"
        ));
    }

    #[test]
    fn test_not_an_object() {
        let err = Normalizer::new().normalize(&json!("obs")).unwrap_err();
        assert!(err.is_invalid_observation());
    }

    #[test]
    fn test_value_embedded_entity_collapses() {
        let p = Normalizer::new()
            .normalize(&json!({"p": "author", "v": {"@type": "Person", "@id": "p1", "name": "Jane"}}))
            .unwrap()
            .unwrap();
        assert_eq!(p.value, Some(Value::Reference(EntityRef::new("Person", "p1"))));
    }
}
