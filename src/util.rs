//! Small helpers shared across modules: identifier generation and
//! order-preserving deduplication.

use uuid::Uuid;

/// Returns a fresh, globally unique identifier string.
#[must_use]
pub fn new_identifier() -> String {
    Uuid::new_v4().to_string()
}

/// Removes duplicate elements while keeping the first occurrence of each.
///
/// Equality is structural (`PartialEq`), so two references to the same entity
/// collapse even when they were built separately. Quadratic, which is fine
/// for the per-property value lists it is used on.
#[must_use]
pub fn deduplicate<T: PartialEq + Clone>(items: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

/// Short JSON kind name used in error messages.
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
