//! Comparator: the rank order over observations.
//!
//! Rank walks a fixed chain of keys, most significant first:
//! `credibility`, `observationDate`, `systemDate`, `position`.
//! A defined key always outranks an undefined one. Because `position` is
//! unique per created observation, two distinct observations never tie.

use std::cmp::Ordering;

use crate::observation::Observation;

/// Rank keys, most significant first.
pub const RANK_KEYS: [&str; 4] = ["credibility", "observationDate", "systemDate", "position"];

/// Direction for [`sort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Lowest rank first.
    Ascending,
    /// Highest rank first.
    #[default]
    Descending,
}

/// Compares two observations by rank.
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use observa::{compare, Credibility, EntityRef, Reconciler};
///
/// let r = Reconciler::new();
/// let thing = EntityRef::new("Thing", "t1");
/// let low = r.observation().object(&thing).property("name").value("a")
///     .credibility(Credibility::new(0.3).unwrap()).build().unwrap();
/// let high = r.observation().object(&thing).property("name").value("b")
///     .credibility(Credibility::new(0.9).unwrap()).build().unwrap();
///
/// assert_eq!(compare(&low, &high), Ordering::Less);
/// ```
#[must_use]
pub fn compare(a: &Observation, b: &Observation) -> Ordering {
    // Option orders None below Some, which is exactly "undefined is minimal".
    a.credibility
        .cmp(&b.credibility)
        .then_with(|| a.observation_date.cmp(&b.observation_date))
        .then_with(|| a.system_date.cmp(&b.system_date))
        .then_with(|| a.position.cmp(&b.position))
}

/// Strictly lower rank.
#[must_use]
pub fn lt(a: &Observation, b: &Observation) -> bool {
    compare(a, b) == Ordering::Less
}

/// Lower or equal rank.
#[must_use]
pub fn le(a: &Observation, b: &Observation) -> bool {
    compare(a, b) != Ordering::Greater
}

/// Strictly higher rank.
#[must_use]
pub fn gt(a: &Observation, b: &Observation) -> bool {
    compare(a, b) == Ordering::Greater
}

/// Higher or equal rank.
#[must_use]
pub fn ge(a: &Observation, b: &Observation) -> bool {
    compare(a, b) != Ordering::Less
}

/// Returns a sorted copy of `observations`.
///
/// Rank ties (only possible for observations sharing a position, e.g. the
/// same observation fed twice) fall back to the id so the result never
/// depends on input order.
#[must_use]
pub fn sort(observations: &[Observation], order: SortOrder) -> Vec<Observation> {
    let mut sorted = observations.to_vec();
    sorted.sort_by(|a, b| {
        let ordering = compare(a, b).then_with(|| a.id.cmp(&b.id));
        match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });
    sorted
}
