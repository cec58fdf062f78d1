//! # observa - Observation Reconciliation
//!
//! observa reconciles multiple, possibly conflicting, sourced assertions about
//! the properties of entities into one canonical record per entity.
//!
//! ## Core Concepts
//!
//! - **Observation**: one assertion that a property of an entity took (or
//!   stopped taking) a value, with provenance and credibility
//! - **Rank**: the total order used to decide which observation wins
//!   (`credibility`, then `observationDate`, `systemDate`, `position`)
//! - **Active set**: the observations still in force once `set` supersession,
//!   `delete` tombstones and observation groups are applied
//! - **Entity record**: the compiled current state of one entity
//! - **Analysis record**: the evidence behind each value of each property
//!
//! ## Usage
//!
//! ```rust
//! use observa::{Credibility, Entity, Filter, Reconciler, SnapshotMetadata};
//!
//! let r = Reconciler::new();
//! let snapshot = Entity::new("Thing", "thing1").with_property("name", "Widget");
//! let meta = SnapshotMetadata::new().credibility(Credibility::new(0.7).unwrap());
//!
//! let observations = r.entity_to_observations(&snapshot, &meta).unwrap();
//! let records = r.compile(&observations, Some(&Filter::new().ge("c", 0.5))).unwrap();
//! assert_eq!(records[0].get("name").unwrap().first().unwrap().as_string(), Some("Widget"));
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod credibility;
pub mod entity;
pub mod error;
pub mod observation;
pub mod sequence;
pub mod time;
pub mod util;
pub mod value;

// Reconciliation pipeline
pub mod analyze;
pub mod compare;
pub mod compile;
pub mod config;
pub mod display;
pub mod engine;
pub mod filter;
pub mod normalize;
pub mod resolve;
pub mod snapshot;

pub use analyze::{analyze_many, analyze_one, AnalysisRecord, ValueEvidence};
pub use compare::{compare, ge, gt, le, lt, sort, SortOrder, RANK_KEYS};
pub use compile::{compile, compile_one, EntityRecord, PropertyValue};
pub use config::{ReconcilerConfig, SnapshotAction};
pub use credibility::Credibility;
pub use display::ObservationTable;
pub use engine::Reconciler;
pub use entity::{AsReference, Entity, EntityRef, EntityValue, FlatRecord};
pub use error::{ObservaError, ObservaResult, ValidationError};
pub use filter::{filter, Clause, CompiledFilter, Filter, Operator};
pub use normalize::{normalize_observation, Normalizer};
pub use observation::{
    Action, Observation, ObservationBuilder, ObservationGroup, ObservationId, PartialObservation,
};
pub use resolve::active_observations;
pub use sequence::{Clock, FixedClock, Sequencer, SystemClock};
pub use snapshot::SnapshotMetadata;
pub use time::Bounds;
pub use value::Value;
