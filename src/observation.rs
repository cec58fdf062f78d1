//! Observations: the atomic unit of evidence.
//!
//! An observation states that a property of an entity took (or stopped
//! taking) a value, and records who produced it, when, and how confidently.
//! Observations are append-only: retraction is a new `delete` observation.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credibility::Credibility;
use crate::entity::{AsReference, EntityRef};
use crate::error::{ObservaResult, ValidationError};
use crate::sequence::{Clock, Sequencer};
use crate::util::new_identifier;
use crate::value::Value;

/// Globally unique observation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservationId(String);

impl ObservationId {
    /// Creates a new random observation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(new_identifier())
    }

    /// Wraps an existing identifier (e.g. one read from a log).
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ObservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an observation does to its (entity, property, value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Asserts the value.
    Set,
    /// Retracts a prior assertion of the value (tombstone).
    Delete,
}

impl FromStr for Action {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "set" => Ok(Self::Set),
            "delete" => Ok(Self::Delete),
            other => Err(ValidationError::InvalidAction {
                action: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => write!(f, "set"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Correlation key for observations created atomically from one snapshot.
///
/// Members of one group never suppress each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "EntityRef", from = "EntityRef")]
pub struct ObservationGroup {
    id: String,
}

impl ObservationGroup {
    /// Entity type echoed by the reference form.
    pub const TYPE: &'static str = "ObservationGroup";

    /// Creates a group with a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self { id: new_identifier() }
    }

    /// Creates a group with a known identifier.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Default for ObservationGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl AsReference for ObservationGroup {
    fn as_reference(&self) -> EntityRef {
        EntityRef::new(Self::TYPE, self.id.clone())
    }
}

impl From<ObservationGroup> for EntityRef {
    fn from(group: ObservationGroup) -> Self {
        EntityRef::new(ObservationGroup::TYPE, group.id)
    }
}

impl From<EntityRef> for ObservationGroup {
    fn from(r: EntityRef) -> Self {
        Self { id: r.id }
    }
}

/// A normalized observation.
///
/// `action` is kept exactly as given: an absent action behaves as `set`
/// when suppressed but never suppresses anything itself.
///
/// # Examples
///
/// ```
/// use observa::{Action, EntityRef, Reconciler};
///
/// let reconciler = Reconciler::new();
/// let obs = reconciler
///     .observation()
///     .action(Action::Set)
///     .object(&EntityRef::new("Ticket", "t1"))
///     .property("status")
///     .value("open")
///     .build()
///     .unwrap();
///
/// assert_eq!(obs.property_id, "status");
/// assert!(obs.asserts());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(rename = "@id")]
    pub id: ObservationId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,

    pub object: EntityRef,

    #[serde(rename = "propertyID")]
    pub property_id: String,

    #[serde(default)]
    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation_date: Option<DateTime<Utc>>,

    /// When the observation entered the system.
    pub system_date: DateTime<Utc>,

    /// Process-local creation order; unique and strictly increasing.
    pub position: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credibility: Option<Credibility>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<EntityRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<EntityRef>,

    /// Opaque provenance tag; never ranked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation_group: Option<ObservationGroup>,

    /// Unrecognized input keys, passed through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Observation {
    /// Returns the action, reading an absent action as `set`.
    #[must_use]
    pub fn effective_action(&self) -> Action {
        self.action.unwrap_or(Action::Set)
    }

    /// True unless this is a `delete` tombstone.
    #[must_use]
    pub fn asserts(&self) -> bool {
        self.effective_action() == Action::Set
    }

    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.action == Some(Action::Delete)
    }

    /// True when both observations belong to the same observation group.
    ///
    /// Observations without a group never share one.
    #[must_use]
    pub fn shares_group(&self, other: &Self) -> bool {
        match (&self.observation_group, &other.observation_group) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Converts back to a partial observation with every field set.
    #[must_use]
    pub fn to_partial(&self) -> PartialObservation {
        PartialObservation {
            id: Some(self.id.clone()),
            action: self.action,
            object: Some(self.object.clone()),
            property_id: Some(self.property_id.clone()),
            value: Some(self.value.clone()),
            observation_date: self.observation_date,
            system_date: Some(self.system_date),
            position: Some(self.position),
            credibility: self.credibility,
            instrument: self.instrument.clone(),
            agent: self.agent.clone(),
            source: self.source.clone(),
            observation_group: self.observation_group.clone(),
            extra: self.extra.clone(),
        }
    }
}

/// An observation whose fields may all be missing.
///
/// Produced by the normalizer from raw input, and used to override defaults
/// when constructing observations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialObservation {
    pub id: Option<ObservationId>,
    pub action: Option<Action>,
    pub object: Option<EntityRef>,
    pub property_id: Option<String>,
    pub value: Option<Value>,
    pub observation_date: Option<DateTime<Utc>>,
    pub system_date: Option<DateTime<Utc>>,
    pub position: Option<u64>,
    pub credibility: Option<Credibility>,
    pub instrument: Option<EntityRef>,
    pub agent: Option<EntityRef>,
    pub source: Option<String>,
    pub observation_group: Option<ObservationGroup>,
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PartialObservation {
    /// Copies every field `other` sets onto `self`; fields `other` leaves
    /// unset are kept.
    pub fn override_with(&mut self, other: &Self) {
        fn take<T: Clone>(slot: &mut Option<T>, from: &Option<T>) {
            if from.is_some() {
                slot.clone_from(from);
            }
        }

        take(&mut self.id, &other.id);
        take(&mut self.action, &other.action);
        take(&mut self.object, &other.object);
        take(&mut self.property_id, &other.property_id);
        take(&mut self.value, &other.value);
        take(&mut self.observation_date, &other.observation_date);
        take(&mut self.system_date, &other.system_date);
        take(&mut self.position, &other.position);
        take(&mut self.credibility, &other.credibility);
        take(&mut self.instrument, &other.instrument);
        take(&mut self.agent, &other.agent);
        take(&mut self.source, &other.source);
        take(&mut self.observation_group, &other.observation_group);
        for (key, value) in &other.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

/// Builder for new observations.
///
/// Positional setters provide defaults; a [`PartialObservation`] passed to
/// [`ObservationBuilder::partial`] wins for every field it sets. `build`
/// assigns a fresh id, the next position and the current system date unless
/// the partial already carries them.
#[derive(Debug)]
pub struct ObservationBuilder<'a> {
    sequencer: &'a Sequencer,
    clock: &'a dyn Clock,
    fields: PartialObservation,
    overrides: Option<PartialObservation>,
}

impl<'a> ObservationBuilder<'a> {
    /// Creates a builder drawing positions and dates from the given sources.
    #[must_use]
    pub fn new(sequencer: &'a Sequencer, clock: &'a dyn Clock) -> Self {
        Self {
            sequencer,
            clock,
            fields: PartialObservation::default(),
            overrides: None,
        }
    }

    #[must_use]
    pub fn action(mut self, action: Action) -> Self {
        self.fields.action = Some(action);
        self
    }

    /// Sets the described entity (collapsed to its reference).
    #[must_use]
    pub fn object(mut self, object: &impl AsReference) -> Self {
        self.fields.object = Some(object.as_reference());
        self
    }

    #[must_use]
    pub fn property(mut self, property_id: impl Into<String>) -> Self {
        self.fields.property_id = Some(property_id.into());
        self
    }

    #[must_use]
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.fields.value = Some(value.into());
        self
    }

    #[must_use]
    pub fn observation_date(mut self, date: DateTime<Utc>) -> Self {
        self.fields.observation_date = Some(date);
        self
    }

    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.fields.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn instrument(mut self, instrument: &impl AsReference) -> Self {
        self.fields.instrument = Some(instrument.as_reference());
        self
    }

    #[must_use]
    pub fn agent(mut self, agent: &impl AsReference) -> Self {
        self.fields.agent = Some(agent.as_reference());
        self
    }

    #[must_use]
    pub fn credibility(mut self, credibility: Credibility) -> Self {
        self.fields.credibility = Some(credibility);
        self
    }

    #[must_use]
    pub fn observation_group(mut self, group: ObservationGroup) -> Self {
        self.fields.observation_group = Some(group);
        self
    }

    /// Overrides defaults with every field the partial sets.
    #[must_use]
    pub fn partial(mut self, partial: PartialObservation) -> Self {
        match self.overrides.as_mut() {
            Some(existing) => existing.override_with(&partial),
            None => self.overrides = Some(partial),
        }
        self
    }

    /// Builds the observation.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingField` if no object or property was
    /// given, or the property id is empty.
    pub fn build(self) -> ObservaResult<Observation> {
        let mut fields = self.fields;
        if let Some(overrides) = &self.overrides {
            fields.override_with(overrides);
        }

        let position = self.sequencer.next_position();
        let now = self.clock.now();

        let object = fields.object.ok_or_else(|| ValidationError::MissingField {
            field: "object".to_string(),
        })?;
        let property_id = fields
            .property_id
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ValidationError::MissingField {
                field: "propertyID".to_string(),
            })?;

        Ok(Observation {
            id: fields.id.unwrap_or_default(),
            action: fields.action,
            object,
            property_id,
            value: fields.value.unwrap_or_default(),
            observation_date: fields.observation_date,
            system_date: fields.system_date.unwrap_or(now),
            position: fields.position.unwrap_or(position),
            credibility: fields.credibility,
            instrument: fields.instrument,
            agent: fields.agent,
            source: fields.source,
            observation_group: fields.observation_group,
            extra: fields.extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::error::ObservaError;
    use crate::sequence::FixedClock;

    fn at(y: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap()
    }

    fn thing() -> EntityRef {
        EntityRef::new("Thing", "thing1")
    }

    #[test]
    fn test_builder_assigns_identity() {
        let seq = Sequencer::starting_at(5);
        let clock = FixedClock(at(2025));
        let obs = ObservationBuilder::new(&seq, &clock)
            .object(&thing())
            .property("name")
            .value("x")
            .build()
            .unwrap();

        assert_eq!(obs.position, 5);
        assert_eq!(obs.system_date, at(2025));
        assert_eq!(obs.action, None);
        assert!(obs.asserts());
        assert!(!obs.id.as_str().is_empty());
    }

    #[test]
    fn test_builder_missing_object() {
        let seq = Sequencer::new();
        let clock = FixedClock(at(2025));
        let err = ObservationBuilder::new(&seq, &clock)
            .property("name")
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ObservaError::InvalidObservation(ValidationError::MissingField {
                field: "object".to_string()
            })
        );
    }

    #[test]
    fn test_builder_empty_property() {
        let seq = Sequencer::new();
        let clock = FixedClock(at(2025));
        let result = ObservationBuilder::new(&seq, &clock)
            .object(&thing())
            .property("")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_partial_wins_only_where_set() {
        let seq = Sequencer::new();
        let clock = FixedClock(at(2025));
        let partial = PartialObservation {
            value: Some(Value::from("from-partial")),
            credibility: Some(Credibility::new(0.9).unwrap()),
            ..PartialObservation::default()
        };

        let obs = ObservationBuilder::new(&seq, &clock)
            .object(&thing())
            .property("name")
            .value("positional")
            .source("crawler")
            .partial(partial)
            .build()
            .unwrap();

        assert_eq!(obs.value, Value::from("from-partial"));
        assert_eq!(obs.credibility.map(Credibility::value), Some(0.9));
        assert_eq!(obs.source.as_deref(), Some("crawler"));
    }

    #[test]
    fn test_partial_keeps_logged_position() {
        let seq = Sequencer::starting_at(100);
        let clock = FixedClock(at(2025));
        let partial = PartialObservation {
            position: Some(7),
            system_date: Some(at(2020)),
            ..PartialObservation::default()
        };
        let obs = ObservationBuilder::new(&seq, &clock)
            .object(&thing())
            .property("name")
            .partial(partial)
            .build()
            .unwrap();
        assert_eq!(obs.position, 7);
        assert_eq!(obs.system_date, at(2020));
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("set".parse::<Action>().unwrap(), Action::Set);
        assert_eq!("delete".parse::<Action>().unwrap(), Action::Delete);
        assert!(matches!(
            "remove".parse::<Action>(),
            Err(ValidationError::InvalidAction { .. })
        ));
    }

    #[test]
    fn test_shares_group() {
        let seq = Sequencer::new();
        let clock = FixedClock(at(2025));
        let group = ObservationGroup::new();
        let make = |g: Option<ObservationGroup>| {
            let b = ObservationBuilder::new(&seq, &clock).object(&thing()).property("p");
            let b = match g {
                Some(g) => b.observation_group(g),
                None => b,
            };
            b.build().unwrap()
        };

        let a = make(Some(group.clone()));
        let b = make(Some(group));
        let c = make(Some(ObservationGroup::new()));
        let d = make(None);
        let e = make(None);

        assert!(a.shares_group(&b));
        assert!(!a.shares_group(&c));
        assert!(!d.shares_group(&e));
    }

    #[test]
    fn test_group_reference_form() {
        let group = ObservationGroup::with_id("g1");
        assert_eq!(group.as_reference(), EntityRef::new("ObservationGroup", "g1"));
        let json = serde_json::to_value(&group).unwrap();
        assert_eq!(json, serde_json::json!({"@type": "ObservationGroup", "@id": "g1"}));
    }

    #[test]
    fn test_observation_serialization() {
        let seq = Sequencer::new();
        let clock = FixedClock(at(2025));
        let obs = ObservationBuilder::new(&seq, &clock)
            .action(Action::Delete)
            .object(&thing())
            .property("status")
            .value("open")
            .observation_group(ObservationGroup::with_id("g1"))
            .build()
            .unwrap();

        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["propertyID"], "status");
        assert_eq!(json["action"], "delete");
        assert_eq!(json["object"]["@id"], "thing1");

        let back: Observation = serde_json::from_value(json).unwrap();
        assert_eq!(back, obs);
    }
}
