//! Values an observation can assert.
//!
//! Values are opaque to the engine: they are compared for equality, never
//! interpreted. Embedded entities only ever appear here as references.

use serde::{Deserialize, Serialize};

use crate::entity::EntityRef;

/// Possible values a property can take.
///
/// # Examples
///
/// ```
/// use observa::Value;
///
/// let name = Value::from("thing1");
/// assert!(name.is_string());
/// assert_eq!(name.as_string(), Some("thing1"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Reference(EntityRef),
    Structured(serde_json::Value),
    Null,
}

impl Value {
    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    pub const fn is_int(&self) -> bool {
        matches!(self, Self::Int(_))
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float(_))
    }

    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub const fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_))
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_reference(&self) -> Option<&EntityRef> {
        match self {
            Self::Reference(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Reference(_) => "reference",
            Self::Structured(_) => "structured",
            Self::Null => "null",
        }
    }

    /// Value equality with `Int` and `Float` compared numerically.
    ///
    /// Every other pairing falls back to structural equality.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::float_cmp)]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => *a as f64 == *b,
            _ => self == other,
        }
    }

    /// Reads a plain JSON value.
    ///
    /// Objects carrying both `@type` and `@id` collapse to a [`Value::Reference`];
    /// any other object or array is kept as [`Value::Structured`].
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map_or(Self::Null, Self::Float),
            },
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Object(obj) => match (
                obj.get("@type").and_then(serde_json::Value::as_str),
                obj.get("@id").and_then(serde_json::Value::as_str),
            ) {
                (Some(entity_type), Some(id)) => Self::Reference(EntityRef::new(entity_type, id)),
                _ => Self::Structured(json.clone()),
            },
            serde_json::Value::Array(_) => Self::Structured(json.clone()),
        }
    }

    /// Renders the value as plain JSON (references as `{"@type", "@id"}`).
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(v) => serde_json::Value::Bool(*v),
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(v) => serde_json::Value::String(v.clone()),
            Self::Reference(r) => r.to_json(),
            Self::Structured(v) => v.clone(),
            Self::Null => serde_json::Value::Null,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v}"),
            Self::Reference(r) => write!(f, "{r}"),
            Self::Structured(v) => write!(f, "{v}"),
            Self::Null => write!(f, "null"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<EntityRef> for Value {
    fn from(v: EntityRef) -> Self {
        Self::Reference(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_int() {
        let val = Value::Int(42);
        assert!(val.is_int());
        assert_eq!(val.as_int(), Some(42));
        assert_eq!(val.as_float(), Some(42.0));
        assert_eq!(val.type_name(), "int");
    }

    #[test]
    fn test_value_string() {
        let val = Value::from("hello");
        assert!(val.is_string());
        assert_eq!(val.as_string(), Some("hello"));
        assert_eq!(val.type_name(), "string");
    }

    #[test]
    fn test_value_type_mismatch() {
        let val = Value::Bool(true);
        assert!(val.as_int().is_none());
        assert!(val.as_float().is_none());
        assert!(val.as_string().is_none());
        assert!(val.as_reference().is_none());
    }

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(Value::from_json(&json!(null)), Value::Null);
        assert_eq!(Value::from_json(&json!(true)), Value::Bool(true));
        assert_eq!(Value::from_json(&json!(7)), Value::Int(7));
        assert_eq!(Value::from_json(&json!(0.25)), Value::Float(0.25));
        assert_eq!(Value::from_json(&json!("x")), Value::from("x"));
    }

    #[test]
    fn test_from_json_collapses_embedded_entity() {
        let val = Value::from_json(&json!({
            "@type": "Person",
            "@id": "p1",
            "name": "Jane"
        }));
        assert_eq!(val, Value::Reference(EntityRef::new("Person", "p1")));
    }

    #[test]
    fn test_from_json_plain_object_is_structured() {
        let raw = json!({"lat": 1.0, "lng": 2.0});
        assert_eq!(Value::from_json(&raw), Value::Structured(raw.clone()));
        assert_eq!(Value::from_json(&raw).to_json(), raw);
    }

    #[test]
    fn test_from_json_bare_type_and_id_stay_structured() {
        let raw = json!({"type": "Point", "id": "p1", "coordinates": [4.8, 45.7]});
        assert_eq!(Value::from_json(&raw), Value::Structured(raw.clone()));
        assert_eq!(Value::from_json(&raw).to_json(), raw);
    }

    #[test]
    fn test_same_as_compares_numbers_numerically() {
        assert!(Value::Int(1).same_as(&Value::Float(1.0)));
        assert!(Value::Float(1.0).same_as(&Value::Int(1)));
        assert!(!Value::Int(1).same_as(&Value::Float(1.5)));
        assert!(!Value::Int(1).same_as(&Value::from("1")));
        assert!(Value::from("a").same_as(&Value::from("a")));
    }

    #[test]
    fn test_reference_to_json() {
        let val = Value::from(EntityRef::new("Thing", "t1"));
        assert_eq!(val.to_json(), json!({"@type": "Thing", "@id": "t1"}));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(format!("{}", Value::Bool(true)), "true");
        assert_eq!(format!("{}", Value::Int(42)), "42");
        assert_eq!(format!("{}", Value::from("hi")), "hi");
        assert_eq!(format!("{}", Value::Null), "null");
        assert_eq!(
            format!("{}", Value::from(EntityRef::new("Thing", "t1"))),
            "Thing/t1"
        );
    }

    #[test]
    fn test_value_serialization() {
        let val = Value::from(EntityRef::new("Thing", "t1"));
        let json = serde_json::to_string(&val).unwrap();
        let deserialized: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(val, deserialized);
    }
}
