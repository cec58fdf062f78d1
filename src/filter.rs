//! Predicate filter over observation fields.
//!
//! A filter is a conjunction of clauses `field <operator> operand`. Field
//! names go through the same shorthand table as raw observations, and each
//! operand is coerced to the kind of its field before evaluation (dates for
//! date fields, references for entity fields, and so on).
//!
//! Operators: `$eq`, `$ne`, `$lt`, `$le`, `$gt`, `$ge` (inclusive where the
//! name says so), `$in`, `$exists`, `$regex`. A bare literal means `$eq`.
//!
//! A clause on a field the observation does not define only matches `$ne`,
//! `$exists: false`, and `$eq: null`.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{OnceLock, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value as Json;

use crate::entity::EntityRef;
use crate::error::{ObservaResult, ValidationError};
use crate::normalize::{canonical_key, Normalizer};
use crate::observation::{Observation, ObservationGroup};
use crate::time::coerce_date;
use crate::util::json_kind;
use crate::value::Value;

/// Comparison operator of a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Exists,
    Regex,
}

impl FromStr for Operator {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "$eq" => Ok(Self::Eq),
            "$ne" => Ok(Self::Ne),
            "$lt" => Ok(Self::Lt),
            "$le" | "$lte" => Ok(Self::Le),
            "$gt" => Ok(Self::Gt),
            "$ge" | "$gte" => Ok(Self::Ge),
            "$in" => Ok(Self::In),
            "$exists" => Ok(Self::Exists),
            "$regex" => Ok(Self::Regex),
            other => Err(ValidationError::InvalidFilter {
                reason: format!("unknown operator '{other}'"),
            }),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Lt => "$lt",
            Self::Le => "$le",
            Self::Gt => "$gt",
            Self::Ge => "$ge",
            Self::In => "$in",
            Self::Exists => "$exists",
            Self::Regex => "$regex",
        };
        write!(f, "{name}")
    }
}

/// One `field <operator> operand` test.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    /// Canonical field name.
    pub field: String,
    pub operator: Operator,
    pub operand: Json,
}

/// Conjunction of clauses.
///
/// # Examples
///
/// ```
/// use observa::Filter;
///
/// let filter = Filter::new()
///     .le("c", 0.5)
///     .ge("observationDate", "2024-01-01");
/// assert_eq!(filter.clauses()[0].field, "credibility");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    /// Creates a filter that matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a clause. The field name may be a shorthand.
    #[must_use]
    pub fn clause(mut self, field: &str, operator: Operator, operand: impl Into<Json>) -> Self {
        self.clauses.push(Clause {
            field: canonical_key(field).to_string(),
            operator,
            operand: operand.into(),
        });
        self
    }

    #[must_use]
    pub fn eq(self, field: &str, operand: impl Into<Json>) -> Self {
        self.clause(field, Operator::Eq, operand)
    }

    #[must_use]
    pub fn ne(self, field: &str, operand: impl Into<Json>) -> Self {
        self.clause(field, Operator::Ne, operand)
    }

    #[must_use]
    pub fn lt(self, field: &str, operand: impl Into<Json>) -> Self {
        self.clause(field, Operator::Lt, operand)
    }

    #[must_use]
    pub fn le(self, field: &str, operand: impl Into<Json>) -> Self {
        self.clause(field, Operator::Le, operand)
    }

    #[must_use]
    pub fn gt(self, field: &str, operand: impl Into<Json>) -> Self {
        self.clause(field, Operator::Gt, operand)
    }

    #[must_use]
    pub fn ge(self, field: &str, operand: impl Into<Json>) -> Self {
        self.clause(field, Operator::Ge, operand)
    }

    #[must_use]
    pub fn is_in(self, field: &str, operands: Vec<Json>) -> Self {
        self.clause(field, Operator::In, Json::Array(operands))
    }

    #[must_use]
    pub fn exists(self, field: &str, present: bool) -> Self {
        self.clause(field, Operator::Exists, present)
    }

    #[must_use]
    pub fn regex(self, field: &str, pattern: &str) -> Self {
        self.clause(field, Operator::Regex, pattern)
    }

    /// Restricts to observations about one entity.
    #[must_use]
    pub fn object(self, reference: &EntityRef) -> Self {
        self.eq("object", reference.to_json())
    }

    /// Parses `{field: literal | {"$op": operand, ...}, ...}`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidFilter` for non-object input or
    /// unknown operators.
    pub fn from_json(raw: &Json) -> Result<Self, ValidationError> {
        let map = raw.as_object().ok_or_else(|| ValidationError::InvalidFilter {
            reason: format!("filter must be an object, found {}", json_kind(raw)),
        })?;

        let mut filter = Self::new();
        for (field, condition) in map {
            match condition.as_object() {
                Some(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
                    for (op, operand) in ops {
                        filter = filter.clause(field, op.parse()?, operand.clone());
                    }
                }
                _ => filter = filter.eq(field, condition.clone()),
            }
        }
        Ok(filter)
    }

    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Coerces every operand; malformed date operands follow the
    /// normalizer's fallback policy.
    ///
    /// # Errors
    ///
    /// Returns `MalformedDate` or `InvalidObservation` for operands that do
    /// not fit their field.
    pub fn compile(&self, normalizer: &Normalizer) -> ObservaResult<CompiledFilter> {
        let tests = self
            .clauses
            .iter()
            .map(|clause| Test::compile(clause, normalizer))
            .collect::<ObservaResult<Vec<_>>>()?;
        Ok(CompiledFilter { tests })
    }

    /// Returns the observations matching every clause, in input order.
    ///
    /// # Errors
    ///
    /// Fails if an operand cannot be coerced (see [`Filter::compile`]).
    pub fn apply(&self, observations: &[Observation]) -> ObservaResult<Vec<Observation>> {
        Ok(self.compile(&Normalizer::new())?.apply(observations))
    }
}

/// A filter whose operands have been coerced.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    tests: Vec<Test>,
}

impl CompiledFilter {
    #[must_use]
    pub fn matches(&self, observation: &Observation) -> bool {
        self.tests.iter().all(|t| t.matches(observation))
    }

    #[must_use]
    pub fn apply(&self, observations: &[Observation]) -> Vec<Observation> {
        let kept: Vec<Observation> = observations
            .iter()
            .filter(|o| self.matches(o))
            .cloned()
            .collect();
        tracing::trace!(clauses = self.tests.len(), input = observations.len(), kept = kept.len(), "filter applied");
        kept
    }
}

const REGEX_CACHE_MAX: usize = 256;

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();

fn cached_regex(field: &str, pattern: &str) -> Result<Regex, ValidationError> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    if let Some(re) = cache.read().unwrap_or_else(PoisonError::into_inner).get(pattern) {
        return Ok(re.clone());
    }

    let compiled = Regex::new(pattern).map_err(|e| ValidationError::InvalidFilter {
        reason: format!("bad $regex on '{field}': {e}"),
    })?;

    let mut guard = cache.write().unwrap_or_else(PoisonError::into_inner);
    if guard.len() >= REGEX_CACHE_MAX {
        guard.clear();
    }
    guard.entry(pattern.to_string()).or_insert_with(|| compiled.clone());
    Ok(compiled)
}

#[derive(Debug, Clone, PartialEq)]
enum Field {
    Id,
    Action,
    Object,
    PropertyId,
    Value,
    ObservationDate,
    SystemDate,
    Position,
    Credibility,
    Instrument,
    Agent,
    Source,
    ObservationGroup,
    Extra(String),
}

impl Field {
    fn parse(name: &str) -> Self {
        match name {
            "@id" | "id" => Self::Id,
            "action" => Self::Action,
            "object" => Self::Object,
            "propertyID" => Self::PropertyId,
            "value" => Self::Value,
            "observationDate" => Self::ObservationDate,
            "systemDate" => Self::SystemDate,
            "position" => Self::Position,
            "credibility" => Self::Credibility,
            "instrument" => Self::Instrument,
            "agent" => Self::Agent,
            "source" => Self::Source,
            "observationGroup" => Self::ObservationGroup,
            other => Self::Extra(other.to_string()),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn read(&self, obs: &Observation) -> Option<Operand> {
        match self {
            Self::Id => Some(Operand::Text(obs.id.to_string())),
            Self::Action => obs.action.map(|a| Operand::Text(a.to_string())),
            Self::Object => Some(Operand::Reference(obs.object.clone())),
            Self::PropertyId => Some(Operand::Text(obs.property_id.clone())),
            Self::Value => Some(Operand::Value(obs.value.clone())),
            Self::ObservationDate => obs.observation_date.map(Operand::Date),
            Self::SystemDate => Some(Operand::Date(obs.system_date)),
            Self::Position => Some(Operand::Number(obs.position as f64)),
            Self::Credibility => obs.credibility.map(|c| Operand::Number(c.value())),
            Self::Instrument => obs.instrument.clone().map(Operand::Reference),
            Self::Agent => obs.agent.clone().map(Operand::Reference),
            Self::Source => obs.source.clone().map(Operand::Text),
            Self::ObservationGroup => obs
                .observation_group
                .clone()
                .map(|g| Operand::Reference(g.into())),
            Self::Extra(key) => obs.extra.get(key).map(|v| Operand::Value(Value::from_json(v))),
        }
    }

    fn coerce(&self, name: &str, raw: &Json, normalizer: &Normalizer) -> ObservaResult<Operand> {
        let operand = match self {
            Self::Id | Self::Action | Self::PropertyId | Self::Source => Operand::Text(
                raw.as_str().map_or_else(|| raw.to_string(), str::to_string),
            ),
            Self::Position | Self::Credibility => {
                Operand::Number(raw.as_f64().ok_or_else(|| ValidationError::WrongType {
                    field: name.to_string(),
                    expected: "a number",
                    found: json_kind(raw).to_string(),
                })?)
            }
            Self::ObservationDate | Self::SystemDate => {
                Operand::Date(coerce_date(name, raw, normalizer.date_fallback())?)
            }
            Self::Object | Self::Instrument | Self::Agent => {
                Operand::Reference(EntityRef::from_json(name, raw)?)
            }
            Self::ObservationGroup => match raw {
                Json::String(id) => Operand::Reference(ObservationGroup::with_id(id.clone()).into()),
                other => Operand::Reference(EntityRef::from_json(name, other)?),
            },
            Self::Value | Self::Extra(_) => Operand::Value(Value::from_json(raw)),
        };
        Ok(operand)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Text(String),
    Number(f64),
    Date(DateTime<Utc>),
    Reference(EntityRef),
    Value(Value),
}

impl Operand {
    fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Number(a), Self::Number(b)) => a.partial_cmp(b),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::Reference(a), Self::Reference(b)) => Some(a.cmp(b)),
            (Self::Value(a), Self::Value(b)) => match (a.as_float(), b.as_float()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => match (a.as_string(), b.as_string()) {
                    (Some(x), Some(y)) => Some(x.cmp(y)),
                    _ => (a == b).then_some(Ordering::Equal),
                },
            },
            _ => None,
        }
    }

    fn equals(&self, other: &Self) -> bool {
        self == other || self.compare(other) == Some(Ordering::Equal)
    }

    fn text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Value(v) => v.as_string(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Test {
    Compare {
        field: Field,
        operator: Operator,
        operand: Operand,
    },
    In {
        field: Field,
        operands: Vec<Operand>,
    },
    Exists {
        field: Field,
        present: bool,
    },
    Regex {
        field: Field,
        pattern: Regex,
    },
}

impl Test {
    fn compile(clause: &Clause, normalizer: &Normalizer) -> ObservaResult<Self> {
        let name = clause.field.as_str();
        let field = Field::parse(name);
        let raw = &clause.operand;

        let test = match clause.operator {
            Operator::Eq if raw.is_null() => Self::Exists { field, present: false },
            Operator::Ne if raw.is_null() => Self::Exists { field, present: true },
            Operator::Exists => Self::Exists {
                field,
                present: raw.as_bool().unwrap_or(!raw.is_null()),
            },
            Operator::In => {
                let items = raw.as_array().ok_or_else(|| ValidationError::WrongType {
                    field: name.to_string(),
                    expected: "an array for $in",
                    found: json_kind(raw).to_string(),
                })?;
                let operands = items
                    .iter()
                    .map(|item| field.coerce(name, item, normalizer))
                    .collect::<ObservaResult<Vec<_>>>()?;
                Self::In { field, operands }
            }
            Operator::Regex => {
                let source = raw.as_str().ok_or_else(|| ValidationError::InvalidFilter {
                    reason: format!("$regex on '{name}' needs a string pattern"),
                })?;
                Self::Regex {
                    field,
                    pattern: cached_regex(name, source)?,
                }
            }
            operator => {
                let operand = field.coerce(name, raw, normalizer)?;
                Self::Compare {
                    field,
                    operator,
                    operand,
                }
            }
        };
        Ok(test)
    }

    fn matches(&self, obs: &Observation) -> bool {
        match self {
            Self::Exists { field, present } => field.read(obs).is_some() == *present,
            Self::In { field, operands } => field
                .read(obs)
                .is_some_and(|v| operands.iter().any(|o| v.equals(o))),
            Self::Regex { field, pattern } => field
                .read(obs)
                .is_some_and(|v| v.text().is_some_and(|s| pattern.is_match(s))),
            Self::Compare {
                field,
                operator,
                operand,
            } => {
                let Some(actual) = field.read(obs) else {
                    return *operator == Operator::Ne;
                };
                match operator {
                    Operator::Eq => actual.equals(operand),
                    Operator::Ne => !actual.equals(operand),
                    Operator::Lt => actual.compare(operand) == Some(Ordering::Less),
                    Operator::Le => matches!(
                        actual.compare(operand),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                    Operator::Gt => actual.compare(operand) == Some(Ordering::Greater),
                    Operator::Ge => matches!(
                        actual.compare(operand),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                    Operator::In | Operator::Exists | Operator::Regex => false,
                }
            }
        }
    }
}

/// Filters observations with a predicate filter.
///
/// # Errors
///
/// Fails if an operand cannot be coerced to its field's kind.
pub fn filter(observations: &[Observation], filter: &Filter) -> ObservaResult<Vec<Observation>> {
    filter.apply(observations)
}
