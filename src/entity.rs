//! Entity payloads and entity references.
//!
//! Observations never embed an entity; they name it by reference
//! (`@type` + `@id`). Full payloads ([`Entity`]) only exist at the input
//! boundary, where they are flattened into one record per entity node.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::util::{deduplicate, json_kind, new_identifier};
use crate::value::Value;

/// Key prefix reserved for entity metadata (`@type`, `@id`, `@context`, ...).
pub const RESERVED_SIGIL: char = '@';

/// Minimal `(type, id)` form used to name an entity.
///
/// # Examples
///
/// ```
/// use observa::EntityRef;
///
/// let r = EntityRef::new("Thing", "thing1");
/// assert_eq!(r.to_string(), "Thing/thing1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "@type")]
    pub entity_type: String,

    #[serde(rename = "@id")]
    pub id: String,
}

impl EntityRef {
    /// Creates a reference from a type and an id.
    #[must_use]
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Collapses a full or partial JSON entity to its reference form.
    ///
    /// Accepts `@type`/`@id` as well as bare `type`/`id` keys; every other key
    /// is dropped.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NotAnObject` for non-object input and
    /// `ValidationError::InvalidReference` when the type or id is missing.
    pub fn from_json(field: &str, json: &serde_json::Value) -> Result<Self, ValidationError> {
        let obj = json.as_object().ok_or_else(|| ValidationError::NotAnObject {
            field: field.to_string(),
            found: json_kind(json).to_string(),
        })?;

        let pick = |keys: [&str; 2]| {
            keys.iter()
                .find_map(|k| obj.get(*k).and_then(serde_json::Value::as_str))
                .map(str::to_string)
        };

        let entity_type = pick(["@type", "type"]).ok_or_else(|| ValidationError::InvalidReference {
            field: field.to_string(),
            reason: "missing @type".to_string(),
        })?;
        let id = pick(["@id", "id"]).ok_or_else(|| ValidationError::InvalidReference {
            field: field.to_string(),
            reason: "missing @id".to_string(),
        })?;

        Ok(Self { entity_type, id })
    }

    /// Renders as `{"@type": .., "@id": ..}`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "@type": self.entity_type,
            "@id": self.id,
        })
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.id)
    }
}

/// Anything that can be collapsed to an [`EntityRef`].
pub trait AsReference {
    /// Returns the `(type, id)` reference form.
    fn as_reference(&self) -> EntityRef;
}

impl AsReference for EntityRef {
    fn as_reference(&self) -> EntityRef {
        self.clone()
    }
}

impl AsReference for Entity {
    fn as_reference(&self) -> EntityRef {
        EntityRef::new(self.entity_type.clone(), self.id.clone())
    }
}

/// A property value inside an entity payload: either a plain value or a
/// nested entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityValue {
    Value(Value),
    Entity(Entity),
}

impl EntityValue {
    fn from_json(json: &serde_json::Value) -> Result<Self, ValidationError> {
        let Some(obj) = json.as_object() else {
            return Ok(Self::Value(Value::from_json(json)));
        };
        if !obj.contains_key("@type") {
            return Ok(Self::Value(Value::from_json(json)));
        }
        let reference_only = obj.contains_key("@id") && obj.keys().all(|k| k == "@type" || k == "@id");
        if reference_only {
            return Ok(Self::Value(Value::Reference(EntityRef::from_json("value", json)?)));
        }
        Ok(Self::Entity(Entity::from_json(json)?))
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Value(v) => v.to_json(),
            Self::Entity(e) => e.to_json(),
        }
    }
}

impl From<Value> for EntityValue {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<Entity> for EntityValue {
    fn from(e: Entity) -> Self {
        Self::Entity(e)
    }
}

impl From<EntityRef> for EntityValue {
    fn from(r: EntityRef) -> Self {
        Self::Value(Value::Reference(r))
    }
}

impl From<&str> for EntityValue {
    fn from(v: &str) -> Self {
        Self::Value(Value::from(v))
    }
}

impl From<String> for EntityValue {
    fn from(v: String) -> Self {
        Self::Value(Value::from(v))
    }
}

impl From<i64> for EntityValue {
    fn from(v: i64) -> Self {
        Self::Value(Value::from(v))
    }
}

impl From<f64> for EntityValue {
    fn from(v: f64) -> Self {
        Self::Value(Value::from(v))
    }
}

impl From<bool> for EntityValue {
    fn from(v: bool) -> Self {
        Self::Value(Value::from(v))
    }
}

/// A full entity snapshot, possibly with nested entities.
///
/// Properties keep every value given for a key, in order. Keys starting with
/// [`RESERVED_SIGIL`] describe the entity itself and are never observed.
///
/// # Examples
///
/// ```
/// use observa::Entity;
///
/// let thing = Entity::new("Thing", "thing1").with_property("name", "Widget");
/// assert_eq!(thing.values("name").len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub entity_type: String,
    pub id: String,
    pub properties: BTreeMap<String, Vec<EntityValue>>,
}

impl Entity {
    /// Creates an empty entity.
    #[must_use]
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Appends a value to a property (builder style).
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<EntityValue>) -> Self {
        self.add_value(key, value);
        self
    }

    /// Appends a value to a property.
    pub fn add_value(&mut self, key: impl Into<String>, value: impl Into<EntityValue>) {
        self.properties.entry(key.into()).or_default().push(value.into());
    }

    /// Returns the values recorded for a property (empty if absent).
    #[must_use]
    pub fn values(&self, key: &str) -> &[EntityValue] {
        self.properties.get(key).map_or(&[][..], Vec::as_slice)
    }

    /// Returns the reference form of this entity.
    #[must_use]
    pub fn reference(&self) -> EntityRef {
        self.as_reference()
    }

    /// Parses a JSON-LD style document.
    ///
    /// `@type` is required. A missing `@id` gets a fresh identifier. Arrays
    /// become multiple values; nested objects with `@type` become nested
    /// entities (or plain references when they carry nothing but `@type`
    /// and `@id`).
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the input is not an object or lacks `@type`.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, ValidationError> {
        let obj = json.as_object().ok_or_else(|| ValidationError::NotAnObject {
            field: "entity".to_string(),
            found: json_kind(json).to_string(),
        })?;

        let entity_type = obj
            .get("@type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ValidationError::MissingField {
                field: "@type".to_string(),
            })?;
        let id = obj
            .get("@id")
            .and_then(serde_json::Value::as_str)
            .map_or_else(new_identifier, str::to_string);

        let mut entity = Self::new(entity_type, id);
        for (key, raw) in obj {
            if key == "@type" || key == "@id" {
                continue;
            }
            let values = match raw {
                serde_json::Value::Array(items) => items
                    .iter()
                    .map(EntityValue::from_json)
                    .collect::<Result<Vec<_>, _>>()?,
                other => vec![EntityValue::from_json(other)?],
            };
            if !values.is_empty() {
                entity.properties.insert(key.clone(), values);
            }
        }
        Ok(entity)
    }

    /// Renders the entity as JSON; single values are unwrapped from arrays.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("@type".to_string(), self.entity_type.clone().into());
        obj.insert("@id".to_string(), self.id.clone().into());
        for (key, values) in &self.properties {
            let rendered = match values.as_slice() {
                [single] => single.to_json(),
                many => serde_json::Value::Array(many.iter().map(EntityValue::to_json).collect()),
            };
            obj.insert(key.clone(), rendered);
        }
        serde_json::Value::Object(obj)
    }

    /// Decomposes the entity graph into one flat record per entity node.
    ///
    /// The root comes first, followed by nested entities depth-first. Nested
    /// entities are replaced by their reference in the parent record.
    #[must_use]
    pub fn flatten(&self) -> Vec<FlatRecord> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        deduplicate(&out)
    }

    fn flatten_into(&self, out: &mut Vec<FlatRecord>) {
        let mut record = FlatRecord {
            reference: self.reference(),
            properties: BTreeMap::new(),
        };
        let mut children = Vec::new();

        for (key, values) in &self.properties {
            let slot = record.properties.entry(key.clone()).or_insert_with(Vec::new);
            for value in values {
                match value {
                    EntityValue::Value(v) => slot.push(v.clone()),
                    EntityValue::Entity(e) => {
                        slot.push(Value::Reference(e.reference()));
                        children.push(e);
                    }
                }
            }
        }

        out.push(record);
        for child in children {
            child.flatten_into(out);
        }
    }
}

/// One entity node of a flattened entity graph.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRecord {
    pub reference: EntityRef,
    pub properties: BTreeMap<String, Vec<Value>>,
}

impl FlatRecord {
    /// Iterates over observable properties, skipping reserved `@` keys.
    pub fn observable(&self) -> impl Iterator<Item = (&String, &Vec<Value>)> {
        self.properties
            .iter()
            .filter(|(key, _)| !key.starts_with(RESERVED_SIGIL))
    }
}
