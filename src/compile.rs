//! Compilation of active observations into current-state entity records.

use std::collections::BTreeMap;

use serde_json::Value as Json;
use tracing::debug;

use crate::compare::{sort, SortOrder};
use crate::entity::{Entity, EntityRef};
use crate::error::ObservaResult;
use crate::filter::Filter;
use crate::observation::Observation;
use crate::resolve::{about, active_members, by_entity};
use crate::value::Value;

/// Current value(s) of one property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Exactly one active value.
    Single(Value),
    /// Several active values, highest rank first.
    Many(Vec<Value>),
}

impl PropertyValue {
    fn from_ranked(mut values: Vec<Value>) -> Option<Self> {
        match values.len() {
            0 => None,
            1 => values.pop().map(Self::Single),
            _ => Some(Self::Many(values)),
        }
    }

    /// All values, highest rank first.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        match self {
            Self::Single(v) => std::slice::from_ref(v),
            Self::Many(vs) => vs,
        }
    }

    /// The highest-ranked value.
    #[must_use]
    pub fn first(&self) -> Option<&Value> {
        self.values().first()
    }

    #[must_use]
    pub const fn is_many(&self) -> bool {
        matches!(self, Self::Many(_))
    }

    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Self::Single(v) => v.to_json(),
            Self::Many(vs) => Json::Array(vs.iter().map(Value::to_json).collect()),
        }
    }
}

/// Compiled current state of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub reference: EntityRef,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl EntityRecord {
    #[must_use]
    pub fn get(&self, property: &str) -> Option<&PropertyValue> {
        self.properties.get(property)
    }

    /// Renders the record as a JSON document with `@type` and `@id`.
    #[must_use]
    pub fn to_json(&self) -> Json {
        let mut obj = serde_json::Map::new();
        obj.insert("@type".to_string(), self.reference.entity_type.clone().into());
        obj.insert("@id".to_string(), self.reference.id.clone().into());
        for (key, value) in &self.properties {
            obj.insert(key.clone(), value.to_json());
        }
        Json::Object(obj)
    }

    /// Converts the record into an entity snapshot, preserving value order.
    #[must_use]
    pub fn to_entity(&self) -> Entity {
        let mut entity = Entity::new(&self.reference.entity_type, &self.reference.id);
        for (key, value) in &self.properties {
            for v in value.values() {
                entity.add_value(key.clone(), v.clone());
            }
        }
        entity
    }
}

/// Compiles the current state of one entity.
///
/// Observations about other entities are ignored. Properties with no active
/// value are omitted.
#[must_use]
pub fn compile_one(entity: &EntityRef, observations: &[Observation]) -> EntityRecord {
    compile_members(entity, &about(entity, observations))
}

fn compile_members(entity: &EntityRef, members: &[&Observation]) -> EntityRecord {
    let active: Vec<Observation> = active_members(members).into_iter().cloned().collect();
    let ranked = sort(&active, SortOrder::Descending);

    let mut grouped: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for obs in ranked {
        let values = grouped.entry(obs.property_id).or_default();
        if !values.iter().any(|v| v.same_as(&obs.value)) {
            values.push(obs.value);
        }
    }

    let properties = grouped
        .into_iter()
        .filter_map(|(key, values)| PropertyValue::from_ranked(values).map(|v| (key, v)))
        .collect();

    EntityRecord {
        reference: entity.clone(),
        properties,
    }
}

/// Compiles one record per entity, optionally filtering the input first.
///
/// Records are sorted by entity reference.
///
/// # Errors
///
/// Fails only if the filter's operands cannot be coerced.
pub fn compile(observations: &[Observation], filter: Option<&Filter>) -> ObservaResult<Vec<EntityRecord>> {
    let selected = match filter {
        Some(f) => f.apply(observations)?,
        None => observations.to_vec(),
    };

    let mut groups = by_entity(&selected);
    groups.sort_by(|a, b| a.0.cmp(&b.0));

    debug!(observations = observations.len(), selected = selected.len(), entities = groups.len(), "compile");
    Ok(groups
        .iter()
        .map(|(entity, members)| compile_members(entity, members))
        .collect())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::credibility::Credibility;
    use crate::entity::EntityValue;
    use crate::observation::{Action, ObservationBuilder};
    use crate::sequence::{FixedClock, Sequencer};

    fn at(y: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap()
    }

    fn thing() -> EntityRef {
        EntityRef::new("Thing", "thing1")
    }

    fn name(seq: &Sequencer, value: &str, credibility: f64) -> Observation {
        ObservationBuilder::new(seq, &FixedClock(at(2025)))
            .object(&thing())
            .property("name")
            .value(value)
            .credibility(Credibility::new(credibility).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_many_values_ranked() {
        let seq = Sequencer::new();
        let obs = vec![name(&seq, "low", 0.2), name(&seq, "high", 0.9), name(&seq, "mid", 0.5)];
        let record = compile_one(&thing(), &obs);
        assert_eq!(
            record.get("name"),
            Some(&PropertyValue::Many(vec!["high".into(), "mid".into(), "low".into()]))
        );
    }

    #[test]
    fn test_singleton_collapses() {
        let seq = Sequencer::new();
        let record = compile_one(&thing(), &[name(&seq, "only", 0.5)]);
        assert_eq!(record.get("name"), Some(&PropertyValue::Single("only".into())));
        assert_eq!(record.to_json(), json!({"@type": "Thing", "@id": "thing1", "name": "only"}));
    }

    #[test]
    fn test_duplicate_values_collapse() {
        let seq = Sequencer::new();
        let obs = vec![name(&seq, "same", 0.2), name(&seq, "same", 0.9)];
        let record = compile_one(&thing(), &obs);
        assert_eq!(record.get("name"), Some(&PropertyValue::Single("same".into())));
    }

    #[test]
    fn test_numerically_equal_values_collapse() {
        let seq = Sequencer::new();
        let clock = FixedClock(at(2025));
        let count = |value: Value, credibility: f64| {
            ObservationBuilder::new(&seq, &clock)
                .object(&thing())
                .property("count")
                .value(value)
                .credibility(Credibility::new(credibility).unwrap())
                .build()
                .unwrap()
        };
        let obs = vec![count(Value::Int(1), 0.2), count(Value::Float(1.0), 0.9)];
        let record = compile_one(&thing(), &obs);
        assert_eq!(record.get("count"), Some(&PropertyValue::Single(Value::Float(1.0))));
    }

    #[test]
    fn test_deleted_property_is_omitted() {
        let seq = Sequencer::new();
        let clock = FixedClock(at(2025));
        let set = name(&seq, "gone", 0.5);
        let delete = ObservationBuilder::new(&seq, &clock)
            .action(Action::Delete)
            .object(&thing())
            .property("name")
            .value("gone")
            .credibility(Credibility::new(0.5).unwrap())
            .build()
            .unwrap();
        let record = compile_one(&thing(), &[set, delete]);
        assert!(record.properties.is_empty());
    }

    #[test]
    fn test_compile_sorted_by_reference() {
        let seq = Sequencer::new();
        let clock = FixedClock(at(2025));
        let b = ObservationBuilder::new(&seq, &clock)
            .object(&EntityRef::new("Thing", "b"))
            .property("name")
            .value("B")
            .build()
            .unwrap();
        let a = ObservationBuilder::new(&seq, &clock)
            .object(&EntityRef::new("Thing", "a"))
            .property("name")
            .value("A")
            .build()
            .unwrap();
        let records = compile(&[b, a], None).unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.reference.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_compile_with_filter() {
        let seq = Sequencer::new();
        let obs = vec![name(&seq, "low", 0.2), name(&seq, "high", 0.9)];
        let records = compile(&obs, Some(&Filter::new().lt("c", 0.5))).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("name").and_then(PropertyValue::first), Some(&Value::from("low")));
    }

    #[test]
    fn test_to_entity_keeps_order() {
        let seq = Sequencer::new();
        let obs = vec![name(&seq, "b", 0.2), name(&seq, "a", 0.9)];
        let entity = compile_one(&thing(), &obs).to_entity();
        assert_eq!(entity.values("name"), &[EntityValue::from("a"), EntityValue::from("b")]);
    }
}
