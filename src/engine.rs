//! Reconciliation facade.
//!
//! [`Reconciler`] owns the configuration, the position counter and the clock,
//! and exposes every operation of the crate with those injected: creating
//! observations, reading raw input, converting snapshots, merging, compiling
//! and analyzing.

use std::sync::Arc;

use serde_json::Value as Json;
use tracing::debug;

use crate::analyze::{analyze_many, analyze_one, AnalysisRecord};
use crate::compile::{compile, compile_one, EntityRecord};
use crate::config::ReconcilerConfig;
use crate::entity::{Entity, EntityRef};
use crate::error::ObservaResult;
use crate::filter::Filter;
use crate::normalize::Normalizer;
use crate::observation::{Observation, ObservationBuilder, PartialObservation};
use crate::resolve::active_observations;
use crate::sequence::{Clock, Sequencer, SystemClock};
use crate::snapshot::{entity_to_observations, SnapshotMetadata};

/// Entry point for reconciling observations.
///
/// # Examples
///
/// ```
/// use observa::{Credibility, Entity, Reconciler, SnapshotMetadata};
///
/// let r = Reconciler::new();
/// let a = Entity::new("Thing", "t1").with_property("name", "Widget");
/// let b = Entity::new("Thing", "t1").with_property("name", "Gadget");
///
/// let merged = r
///     .merge(
///         &a, &SnapshotMetadata::new().credibility(Credibility::new(0.4).unwrap()),
///         &b, &SnapshotMetadata::new().credibility(Credibility::new(0.9).unwrap()),
///     )
///     .unwrap();
/// let name = merged[0].get("name").unwrap();
/// assert_eq!(name.first().unwrap().as_string(), Some("Gadget"));
/// ```
#[derive(Debug, Clone)]
pub struct Reconciler {
    config: ReconcilerConfig,
    sequencer: Arc<Sequencer>,
    clock: Arc<dyn Clock>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    /// Default configuration, process-wide counter, system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ReconcilerConfig::default())
    }

    /// Uses a private counter when `start_position` is set.
    #[must_use]
    pub fn with_config(config: ReconcilerConfig) -> Self {
        let sequencer = config
            .start_position
            .map_or_else(Sequencer::global, |start| Arc::new(Sequencer::starting_at(start)));
        Self {
            config,
            sequencer,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_sequencer(mut self, sequencer: Arc<Sequencer>) -> Self {
        self.sequencer = sequencer;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    #[must_use]
    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Normalizer honoring the configured date fallback.
    #[must_use]
    pub fn normalizer(&self) -> Normalizer {
        match self.config.date_fallback {
            Some(fallback) => Normalizer::new().with_date_fallback(fallback),
            None => Normalizer::new(),
        }
    }

    /// Starts building a new observation.
    #[must_use]
    pub fn observation(&self) -> ObservationBuilder<'_> {
        ObservationBuilder::new(&self.sequencer, self.clock.as_ref())
    }

    /// Creates an observation from a partial one.
    ///
    /// # Errors
    ///
    /// Fails if the partial has no object or property.
    pub fn create_observation(&self, partial: PartialObservation) -> ObservaResult<Observation> {
        self.observation().partial(partial).build()
    }

    /// Reads raw observations (`null`, one mapping, or an array) and creates
    /// them.
    ///
    /// # Errors
    ///
    /// Fails on the first element that does not normalize or lacks an object
    /// or property.
    pub fn observations_from_json(&self, raw: &Json) -> ObservaResult<Vec<Observation>> {
        self.normalizer()
            .normalize_all(raw)?
            .into_iter()
            .map(|partial| self.create_observation(partial))
            .collect()
    }

    /// Reads snapshot metadata with this reconciler's normalizer.
    ///
    /// # Errors
    ///
    /// See [`SnapshotMetadata::from_json`].
    pub fn metadata_from_json(&self, raw: &Json) -> ObservaResult<SnapshotMetadata> {
        SnapshotMetadata::from_json(raw, &self.normalizer())
    }

    /// Converts an entity snapshot into observations.
    ///
    /// # Errors
    ///
    /// Fails if a property key is empty.
    pub fn entity_to_observations(&self, entity: &Entity, metadata: &SnapshotMetadata) -> ObservaResult<Vec<Observation>> {
        entity_to_observations(
            entity,
            metadata,
            self.config.snapshot_action,
            &self.sequencer,
            self.clock.as_ref(),
        )
    }

    /// Parses a JSON entity document and converts it into observations.
    ///
    /// # Errors
    ///
    /// Fails if the document is not a valid entity.
    pub fn json_to_observations(&self, raw: &Json, metadata: &SnapshotMetadata) -> ObservaResult<Vec<Observation>> {
        let entity = Entity::from_json(raw)?;
        self.entity_to_observations(&entity, metadata)
    }

    /// Reconciles two snapshots into compiled records.
    ///
    /// # Errors
    ///
    /// Fails if either snapshot cannot be converted.
    pub fn merge(
        &self,
        a: &Entity,
        metadata_a: &SnapshotMetadata,
        b: &Entity,
        metadata_b: &SnapshotMetadata,
    ) -> ObservaResult<Vec<EntityRecord>> {
        self.merge_all(&[(a.clone(), metadata_a.clone()), (b.clone(), metadata_b.clone())])
    }

    /// Reconciles any number of snapshots into compiled records.
    ///
    /// # Errors
    ///
    /// Fails if a snapshot cannot be converted.
    pub fn merge_all(&self, snapshots: &[(Entity, SnapshotMetadata)]) -> ObservaResult<Vec<EntityRecord>> {
        let mut observations = Vec::new();
        for (entity, metadata) in snapshots {
            observations.extend(self.entity_to_observations(entity, metadata)?);
        }
        debug!(snapshots = snapshots.len(), observations = observations.len(), "merge");
        compile(&observations, None)
    }

    #[must_use]
    pub fn active(&self, observations: &[Observation]) -> Vec<Observation> {
        active_observations(observations)
    }

    /// Applies a filter, coercing date operands with the configured fallback.
    ///
    /// # Errors
    ///
    /// Fails if an operand cannot be coerced.
    pub fn filter(&self, observations: &[Observation], filter: &Filter) -> ObservaResult<Vec<Observation>> {
        Ok(filter.compile(&self.normalizer())?.apply(observations))
    }

    /// Compiles one record per entity, optionally filtering first.
    ///
    /// # Errors
    ///
    /// Fails if the filter's operands cannot be coerced.
    pub fn compile(&self, observations: &[Observation], filter: Option<&Filter>) -> ObservaResult<Vec<EntityRecord>> {
        match filter {
            Some(f) => compile(&self.filter(observations, f)?, None),
            None => compile(observations, None),
        }
    }

    #[must_use]
    pub fn compile_one(&self, entity: &EntityRef, observations: &[Observation]) -> EntityRecord {
        compile_one(entity, observations)
    }

    #[must_use]
    pub fn analyze_one(&self, entity: &EntityRef, observations: &[Observation], active_only: bool) -> AnalysisRecord {
        analyze_one(entity, observations, active_only)
    }

    #[must_use]
    pub fn analyze_many(&self, observations: &[Observation], active_only: bool) -> Vec<AnalysisRecord> {
        analyze_many(observations, active_only)
    }
}
