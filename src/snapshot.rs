//! Conversion of entity snapshots into observations.
//!
//! A snapshot is a whole entity as some source saw it at some moment. Every
//! observable value becomes one observation, all sharing a fresh observation
//! group and the snapshot's metadata.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value as Json;

use crate::config::SnapshotAction;
use crate::credibility::Credibility;
use crate::entity::{AsReference, Entity, EntityRef};
use crate::error::ObservaResult;
use crate::normalize::Normalizer;
use crate::observation::{Action, Observation, ObservationBuilder, ObservationGroup, PartialObservation};
use crate::sequence::{Clock, Sequencer};

/// Provenance copied onto every observation derived from one snapshot.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use observa::{Credibility, SnapshotMetadata};
///
/// let meta = SnapshotMetadata::from(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
///     .credibility(Credibility::new(0.8).unwrap())
///     .source("registry");
/// assert_eq!(meta.source.as_deref(), Some("registry"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotMetadata {
    pub observation_date: Option<DateTime<Utc>>,
    pub instrument: Option<EntityRef>,
    pub agent: Option<EntityRef>,
    pub credibility: Option<Credibility>,
    pub source: Option<String>,
    /// Extra keys copied verbatim.
    pub extra: BTreeMap<String, Json>,
}

impl SnapshotMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn observation_date(mut self, date: DateTime<Utc>) -> Self {
        self.observation_date = Some(date);
        self
    }

    #[must_use]
    pub fn instrument(mut self, instrument: &impl AsReference) -> Self {
        self.instrument = Some(instrument.as_reference());
        self
    }

    #[must_use]
    pub fn agent(mut self, agent: &impl AsReference) -> Self {
        self.agent = Some(agent.as_reference());
        self
    }

    #[must_use]
    pub fn credibility(mut self, credibility: Credibility) -> Self {
        self.credibility = Some(credibility);
        self
    }

    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Reads metadata from a raw mapping; shorthand keys are accepted.
    ///
    /// Keys that describe an observation's identity (`object`, `propertyID`,
    /// `value`, `action`, ids, positions and groups) are ignored.
    ///
    /// # Errors
    ///
    /// Same failures as [`Normalizer::normalize`].
    pub fn from_json(raw: &Json, normalizer: &Normalizer) -> ObservaResult<Self> {
        let Some(partial) = normalizer.normalize(raw)? else {
            return Ok(Self::default());
        };
        Ok(Self {
            observation_date: partial.observation_date,
            instrument: partial.instrument,
            agent: partial.agent,
            credibility: partial.credibility,
            source: partial.source,
            extra: partial.extra,
        })
    }

    fn to_partial(&self) -> PartialObservation {
        PartialObservation {
            observation_date: self.observation_date,
            instrument: self.instrument.clone(),
            agent: self.agent.clone(),
            credibility: self.credibility,
            source: self.source.clone(),
            extra: self.extra.clone(),
            ..PartialObservation::default()
        }
    }
}

impl From<DateTime<Utc>> for SnapshotMetadata {
    fn from(date: DateTime<Utc>) -> Self {
        Self::default().observation_date(date)
    }
}

/// Turns an entity snapshot into observations sharing one new group.
///
/// Nested entities contribute their own observations. Reserved `@` keys are
/// skipped. Within a property, values are emitted last to first, so the first
/// listed value receives the highest position and ranks highest.
///
/// # Errors
///
/// Fails if a property key is empty.
pub fn entity_to_observations(
    entity: &Entity,
    metadata: &SnapshotMetadata,
    action: SnapshotAction,
    sequencer: &Sequencer,
    clock: &dyn Clock,
) -> ObservaResult<Vec<Observation>> {
    let group = ObservationGroup::new();
    let provenance = metadata.to_partial();
    let mut out = Vec::new();

    for record in entity.flatten() {
        for (key, values) in record.observable() {
            for value in values.iter().rev() {
                let builder = ObservationBuilder::new(sequencer, clock)
                    .object(&record.reference)
                    .property(key.clone())
                    .value(value.clone())
                    .observation_group(group.clone())
                    .partial(provenance.clone());
                let builder = match action {
                    SnapshotAction::Set => builder.action(Action::Set),
                    SnapshotAction::Implicit => builder,
                };
                out.push(builder.build()?);
            }
        }
    }

    tracing::debug!(entity = %entity.reference(), group = group.id(), observations = out.len(), "snapshot converted");
    Ok(out)
}
