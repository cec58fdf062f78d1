//! Active-set resolution.
//!
//! Within each (entity, property) partition:
//!
//! 1. Every explicit `set` observation `d` suppresses each observation ranked
//!    strictly below it, unless the two share an observation group.
//!    Observations without an action are implicit sets: they can be
//!    suppressed but never suppress.
//! 2. Every remaining `delete` observation `d` suppresses each observation
//!    ranked strictly below it that carries the same value, unless the two
//!    share an observation group.
//! 3. Delete tombstones never appear in the active set.
//!
//! Entities and properties are emitted in order of first appearance; within a
//! partition surviving observations keep their input order.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::compare::lt;
use crate::entity::EntityRef;
use crate::observation::{Action, Observation};

/// Observations grouped by entity, entities in order of first appearance.
#[must_use]
pub fn by_entity(observations: &[Observation]) -> Vec<(EntityRef, Vec<&Observation>)> {
    let mut index: HashMap<&EntityRef, usize> = HashMap::new();
    let mut groups: Vec<(EntityRef, Vec<&Observation>)> = Vec::new();
    for obs in observations {
        let slot = *index.entry(&obs.object).or_insert_with(|| {
            groups.push((obs.object.clone(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(obs);
    }
    groups
}

/// Distinct entity references, in order of first appearance.
#[must_use]
pub fn entities(observations: &[Observation]) -> Vec<EntityRef> {
    by_entity(observations).into_iter().map(|(entity, _)| entity).collect()
}

/// Observations about one entity.
#[must_use]
pub fn about<'a>(entity: &EntityRef, observations: &'a [Observation]) -> Vec<&'a Observation> {
    observations.iter().filter(|o| &o.object == entity).collect()
}

/// Computes the active observations for every entity in the input.
///
/// # Examples
///
/// ```
/// use observa::{active_observations, Action, Credibility, EntityRef, Reconciler};
///
/// let r = Reconciler::new();
/// let ticket = EntityRef::new("Ticket", "t1");
/// let open = r.observation().action(Action::Set).object(&ticket)
///     .property("status").value("open").build().unwrap();
/// let closed = r.observation().action(Action::Set).object(&ticket)
///     .property("status").value("closed")
///     .credibility(Credibility::new(0.9).unwrap()).build().unwrap();
///
/// let active = active_observations(&[open, closed.clone()]);
/// assert_eq!(active, vec![closed]);
/// ```
#[must_use]
pub fn active_observations(observations: &[Observation]) -> Vec<Observation> {
    let mut active = Vec::with_capacity(observations.len());
    for (entity, members) in by_entity(observations) {
        let before = active.len();
        active.extend(active_members(&members).into_iter().cloned());
        debug!(
            entity = %entity,
            observations = members.len(),
            active = active.len() - before,
            "resolved active set"
        );
    }
    active
}

/// Active observations for one entity only.
#[must_use]
pub fn active_for(entity: &EntityRef, observations: &[Observation]) -> Vec<Observation> {
    active_members(&about(entity, observations)).into_iter().cloned().collect()
}

/// Resolves the observations of a single entity.
///
/// Properties come out in order of first appearance.
pub(crate) fn active_members<'a>(members: &[&'a Observation]) -> Vec<&'a Observation> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut partitions: Vec<Vec<&Observation>> = Vec::new();
    for obs in members {
        let slot = *index.entry(obs.property_id.as_str()).or_insert_with(|| {
            partitions.push(Vec::new());
            partitions.len() - 1
        });
        partitions[slot].push(obs);
    }
    partitions.iter().flat_map(|partition| resolve_partition(partition)).collect()
}

fn resolve_partition<'a>(partition: &[&'a Observation]) -> Vec<&'a Observation> {
    let sets: Vec<&Observation> = partition
        .iter()
        .copied()
        .filter(|o| o.action == Some(Action::Set))
        .collect();

    let survivors: Vec<&Observation> = partition
        .iter()
        .copied()
        .filter(|x| {
            let suppressor = sets.iter().find(|d| lt(x, d) && !x.shares_group(d));
            if let Some(d) = suppressor {
                trace!(suppressed = %x.id, by = %d.id, property = %x.property_id, "set supersedes");
            }
            suppressor.is_none()
        })
        .collect();

    let deletes: Vec<&Observation> = survivors.iter().copied().filter(|o| o.is_tombstone()).collect();

    survivors
        .into_iter()
        .filter(|x| !x.is_tombstone())
        .filter(|x| {
            let suppressor = deletes
                .iter()
                .find(|d| x.value.same_as(&d.value) && lt(x, d) && !x.shares_group(d));
            if let Some(d) = suppressor {
                trace!(suppressed = %x.id, by = %d.id, property = %x.property_id, "deleted");
            }
            suppressor.is_none()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::credibility::Credibility;
    use crate::observation::{ObservationBuilder, ObservationGroup};
    use crate::sequence::{FixedClock, Sequencer};
    use crate::value::Value;

    fn at(y: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap()
    }

    struct Log {
        seq: Sequencer,
        clock: FixedClock,
    }

    impl Log {
        fn new() -> Self {
            Self {
                seq: Sequencer::new(),
                clock: FixedClock(at(2025)),
            }
        }

        fn obs(&self, id: &str, property: &str, value: &str, action: Option<Action>) -> ObservationBuilder<'_> {
            let builder = ObservationBuilder::new(&self.seq, &self.clock)
                .object(&EntityRef::new("Thing", id))
                .property(property)
                .value(value);
            match action {
                Some(action) => builder.action(action),
                None => builder,
            }
        }
    }

    fn values(obs: &[Observation]) -> Vec<Value> {
        obs.iter().map(|o| o.value.clone()).collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(active_observations(&[]).is_empty());
    }

    #[test]
    fn test_higher_set_supersedes() {
        let log = Log::new();
        let old = log.obs("t1", "status", "open", Some(Action::Set)).build().unwrap();
        let new = log.obs("t1", "status", "closed", Some(Action::Set)).build().unwrap();
        assert_eq!(active_observations(&[new.clone(), old]), vec![new]);
    }

    #[test]
    fn test_implicit_observations_coexist() {
        let log = Log::new();
        let a = log.obs("t1", "name", "a", None).build().unwrap();
        let b = log.obs("t1", "name", "b", None).build().unwrap();
        assert_eq!(active_observations(&[a.clone(), b.clone()]), vec![a, b]);
    }

    #[test]
    fn test_explicit_set_suppresses_lower_implicit() {
        let log = Log::new();
        let implicit = log.obs("t1", "name", "a", None).build().unwrap();
        let set = log.obs("t1", "name", "b", Some(Action::Set)).build().unwrap();
        let higher_implicit = log.obs("t1", "name", "c", None).build().unwrap();
        let active = active_observations(&[implicit, set.clone(), higher_implicit.clone()]);
        assert_eq!(active, vec![set, higher_implicit]);
    }

    #[test]
    fn test_tombstone_suppresses_same_value() {
        let log = Log::new();
        let set = log.obs("t1", "status", "active", Some(Action::Set)).build().unwrap();
        let delete = log.obs("t1", "status", "active", Some(Action::Delete)).build().unwrap();
        assert!(active_observations(&[set, delete]).is_empty());
    }

    #[test]
    fn test_tombstone_keeps_other_values() {
        let log = Log::new();
        let red = log.obs("t1", "color", "red", None).build().unwrap();
        let blue = log.obs("t1", "color", "blue", None).build().unwrap();
        let delete = log.obs("t1", "color", "red", Some(Action::Delete)).build().unwrap();
        assert_eq!(values(&active_observations(&[red, blue, delete])), vec![Value::from("blue")]);
    }

    #[test]
    fn test_tombstone_matches_numbers_numerically() {
        let log = Log::new();
        let thing = EntityRef::new("Thing", "t1");
        let set = ObservationBuilder::new(&log.seq, &log.clock)
            .action(Action::Set)
            .object(&thing)
            .property("count")
            .value(1_i64)
            .build()
            .unwrap();
        let delete = ObservationBuilder::new(&log.seq, &log.clock)
            .action(Action::Delete)
            .object(&thing)
            .property("count")
            .value(1.0)
            .build()
            .unwrap();
        assert!(active_observations(&[set, delete]).is_empty());
    }

    #[test]
    fn test_by_entity_groups_in_first_appearance_order() {
        let log = Log::new();
        let b = log.obs("b", "name", "x", None).build().unwrap();
        let a = log.obs("a", "name", "y", None).build().unwrap();
        let b2 = log.obs("b", "size", "z", None).build().unwrap();
        let log_entries = [b.clone(), a.clone(), b2.clone()];
        let groups = by_entity(&log_entries);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, EntityRef::new("Thing", "b"));
        assert_eq!(groups[0].1, vec![&b, &b2]);
        assert_eq!(groups[1].1, vec![&a]);
    }

    #[test]
    fn test_active_for_matches_full_resolution() {
        let log = Log::new();
        let t1 = log.obs("t1", "status", "open", Some(Action::Set)).build().unwrap();
        let t2 = log.obs("t2", "status", "open", Some(Action::Set)).build().unwrap();
        let t1_newer = log.obs("t1", "status", "closed", Some(Action::Set)).build().unwrap();
        let all = [t1, t2, t1_newer.clone()];
        assert_eq!(active_for(&EntityRef::new("Thing", "t1"), &all), vec![t1_newer]);
    }

    #[test]
    fn test_lower_tombstone_does_not_delete() {
        let log = Log::new();
        let delete = log.obs("t1", "status", "active", Some(Action::Delete)).build().unwrap();
        let set = log.obs("t1", "status", "active", None).build().unwrap();
        assert_eq!(active_observations(&[delete, set.clone()]), vec![set]);
    }

    #[test]
    fn test_group_members_survive_each_other() {
        let log = Log::new();
        let group = ObservationGroup::new();
        let a = log
            .obs("t1", "name", "a", Some(Action::Set))
            .observation_group(group.clone())
            .build()
            .unwrap();
        let b = log
            .obs("t1", "name", "b", Some(Action::Set))
            .observation_group(group)
            .build()
            .unwrap();
        assert_eq!(active_observations(&[a.clone(), b.clone()]), vec![a, b]);
    }

    #[test]
    fn test_group_does_not_shield_from_outsiders() {
        let log = Log::new();
        let group = ObservationGroup::new();
        let a = log
            .obs("t1", "name", "a", Some(Action::Set))
            .observation_group(group.clone())
            .build()
            .unwrap();
        let b = log
            .obs("t1", "name", "b", Some(Action::Set))
            .observation_group(group)
            .build()
            .unwrap();
        let outsider = log
            .obs("t1", "name", "c", Some(Action::Set))
            .credibility(Credibility::certain())
            .build()
            .unwrap();
        assert_eq!(active_observations(&[a, b, outsider.clone()]), vec![outsider]);
    }

    #[test]
    fn test_entities_and_properties_independent() {
        let log = Log::new();
        let t1_name = log.obs("t1", "name", "x", Some(Action::Set)).build().unwrap();
        let t2_name = log.obs("t2", "name", "y", Some(Action::Set)).build().unwrap();
        let t1_size = log.obs("t1", "size", "big", Some(Action::Set)).build().unwrap();
        let t1_name_newer = log.obs("t1", "name", "z", Some(Action::Set)).build().unwrap();

        let active = active_observations(&[t1_name, t2_name.clone(), t1_size.clone(), t1_name_newer.clone()]);
        assert_eq!(active, vec![t1_name_newer, t1_size, t2_name]);
    }

    #[test]
    fn test_duplicate_input_is_kept() {
        let log = Log::new();
        let a = log.obs("t1", "name", "a", Some(Action::Set)).build().unwrap();
        assert_eq!(active_observations(&[a.clone(), a.clone()]).len(), 2);
    }

    #[test]
    fn test_entities_first_appearance() {
        let log = Log::new();
        let b = log.obs("b", "name", "x", None).build().unwrap();
        let a = log.obs("a", "name", "x", None).build().unwrap();
        let b2 = log.obs("b", "size", "x", None).build().unwrap();
        assert_eq!(
            entities(&[b, a, b2]),
            vec![EntityRef::new("Thing", "b"), EntityRef::new("Thing", "a")]
        );
    }
}
