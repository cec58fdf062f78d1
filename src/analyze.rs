//! Evidence summaries per property value.
//!
//! Where the compiler answers "what is the value now", the analyzer answers
//! "how well supported is each value": how many observations back it, from
//! how many distinct instruments and agents, with what credibility range and
//! over which dates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Value as Json};
use tracing::debug;

use crate::compare::{sort, SortOrder};
use crate::credibility::Credibility;
use crate::entity::EntityRef;
use crate::observation::Observation;
use crate::resolve::{about, active_members, by_entity};
use crate::time::Bounds;
use crate::value::Value;

/// Evidence behind one value of one property.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueEvidence {
    pub property_id: String,
    pub value: Value,
    pub observation_count: usize,
    pub credibility: Bounds<f64>,
    /// Distinct defined instruments.
    pub instrument_count: usize,
    /// Distinct defined agents.
    pub agent_count: usize,
    pub observation_date: Bounds<DateTime<Utc>>,
    pub system_date: Bounds<DateTime<Utc>>,
}

impl ValueEvidence {
    fn summarize(property_id: &str, value: &Value, backing: &[&Observation]) -> Self {
        Self {
            property_id: property_id.to_string(),
            value: value.clone(),
            observation_count: backing.len(),
            credibility: Bounds::of(backing.iter().map(|o| o.credibility.map(Credibility::value))),
            instrument_count: distinct(backing.iter().filter_map(|o| o.instrument.as_ref())),
            agent_count: distinct(backing.iter().filter_map(|o| o.agent.as_ref())),
            observation_date: Bounds::of(backing.iter().map(|o| o.observation_date)),
            system_date: Bounds::of(backing.iter().map(|o| Some(o.system_date))),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Json {
        fn dates(b: &Bounds<DateTime<Utc>>) -> Json {
            json!({
                "min": b.min.map(|d| d.to_rfc3339()),
                "max": b.max.map(|d| d.to_rfc3339()),
            })
        }

        json!({
            "propertyID": self.property_id,
            "value": self.value.to_json(),
            "observationCount": self.observation_count,
            "credibility": {"min": self.credibility.min, "max": self.credibility.max},
            "instrumentCount": self.instrument_count,
            "agentCount": self.agent_count,
            "observationDate": dates(&self.observation_date),
            "systemDate": dates(&self.system_date),
        })
    }
}

fn distinct<'a>(refs: impl Iterator<Item = &'a EntityRef>) -> usize {
    let mut seen: Vec<&EntityRef> = Vec::new();
    for r in refs {
        if !seen.contains(&r) {
            seen.push(r);
        }
    }
    seen.len()
}

/// Evidence summary for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRecord {
    pub reference: EntityRef,
    /// Per property, one summary per distinct value, highest rank first.
    pub properties: BTreeMap<String, Vec<ValueEvidence>>,
}

impl AnalysisRecord {
    #[must_use]
    pub fn get(&self, property: &str) -> &[ValueEvidence] {
        self.properties.get(property).map_or(&[][..], Vec::as_slice)
    }

    #[must_use]
    pub fn to_json(&self) -> Json {
        let mut obj = serde_json::Map::new();
        obj.insert("@type".to_string(), self.reference.entity_type.clone().into());
        obj.insert("@id".to_string(), self.reference.id.clone().into());
        for (key, evidence) in &self.properties {
            obj.insert(
                key.clone(),
                Json::Array(evidence.iter().map(ValueEvidence::to_json).collect()),
            );
        }
        Json::Object(obj)
    }
}

/// Summarizes the evidence about one entity.
///
/// With `active_only`, only the active set is considered; otherwise every
/// observation about the entity counts, tombstones included.
#[must_use]
pub fn analyze_one(entity: &EntityRef, observations: &[Observation], active_only: bool) -> AnalysisRecord {
    analyze_members(entity, &about(entity, observations), active_only)
}

fn analyze_members(entity: &EntityRef, members: &[&Observation], active_only: bool) -> AnalysisRecord {
    let selected: Vec<Observation> = if active_only {
        active_members(members).into_iter().cloned().collect()
    } else {
        members.iter().copied().cloned().collect()
    };
    let ranked = sort(&selected, SortOrder::Descending);

    let mut grouped: BTreeMap<String, Vec<(Value, Vec<&Observation>)>> = BTreeMap::new();
    for obs in &ranked {
        let buckets = grouped.entry(obs.property_id.clone()).or_default();
        match buckets.iter_mut().find(|(v, _)| v.same_as(&obs.value)) {
            Some((_, backing)) => backing.push(obs),
            None => buckets.push((obs.value.clone(), vec![obs])),
        }
    }

    let properties = grouped
        .into_iter()
        .map(|(property, buckets)| {
            let evidence = buckets
                .iter()
                .map(|(value, backing)| ValueEvidence::summarize(&property, value, backing))
                .collect();
            (property, evidence)
        })
        .collect();

    debug!(entity = %entity, observations = ranked.len(), active_only, "analyze");
    AnalysisRecord {
        reference: entity.clone(),
        properties,
    }
}

/// Summarizes every entity in the input, sorted by entity reference.
#[must_use]
pub fn analyze_many(observations: &[Observation], active_only: bool) -> Vec<AnalysisRecord> {
    let mut groups = by_entity(observations);
    groups.sort_by(|a, b| a.0.cmp(&b.0));
    groups
        .iter()
        .map(|(entity, members)| analyze_members(entity, members, active_only))
        .collect()
}
