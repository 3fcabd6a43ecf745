//! Component descriptions
//!
//! A [`Component`] is one building block of a configuration: it provides
//! capability tags, requires further capabilities, and exposes a typed
//! parameter schema. Components are deserialized from the JSON search-space
//! format via raw mirror structs so malformed schemas fail with a
//! [`SpaceError`] instead of a panic later on.

use crate::error::SpaceError;
use indexmap::IndexMap;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Position a value takes when the component is constructed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstructionKey {
    /// Positional argument index
    Position(usize),
    /// Keyword argument name
    Keyword(String),
}

/// Declared type and domain of a tunable parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterKind {
    /// Integer in `[min, max]`
    Int {
        /// Inclusive lower bound
        min: i64,
        /// Inclusive upper bound
        max: i64,
    },
    /// Real number in `[min, max]`
    Double {
        /// Inclusive lower bound
        min: f64,
        /// Inclusive upper bound
        max: f64,
    },
    /// Boolean flag
    Bool,
    /// One of an ordered list of values
    Categorical {
        /// Allowed values, order defines the vector encoding
        values: Vec<Value>,
    },
}

/// A concrete parameter value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// Integer value
    Int(i64),
    /// Real value
    Double(f64),
    /// Boolean value
    Bool(bool),
    /// Categorical value (one of the declared values)
    Categorical(Value),
}

impl ParameterValue {
    /// Convert to the JSON representation handed to evaluators
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(v) => Value::from(*v),
            Self::Double(v) => Value::from(*v),
            Self::Bool(v) => Value::Bool(*v),
            Self::Categorical(v) => v.clone(),
        }
    }
}

/// Typed parameter description
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawParameter")]
pub struct ParameterSpec {
    /// Parameter name, unique within its component
    pub name: String,
    /// Type and domain
    pub kind: ParameterKind,
    /// Declared default, if any
    pub default: Option<ParameterValue>,
    /// Construction position
    pub construction_key: Option<ConstructionKey>,
}

#[derive(Debug, Deserialize)]
struct RawParameter {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    min: Option<f64>,
    max: Option<f64>,
    values: Option<Vec<Value>>,
    default: Option<Value>,
    construction_key: Option<ConstructionKey>,
}

impl TryFrom<RawParameter> for ParameterSpec {
    type Error = SpaceError;

    fn try_from(raw: RawParameter) -> Result<Self, Self::Error> {
        let invalid = |reason: &str| SpaceError::InvalidParameter {
            name: raw.name.clone(),
            reason: reason.to_string(),
        };

        let kind = match raw.kind.as_str() {
            "int" | "double" => {
                let (Some(min), Some(max)) = (raw.min, raw.max) else {
                    return Err(invalid("numeric parameter needs `min` and `max`"));
                };
                if min > max {
                    return Err(invalid("`min` is greater than `max`"));
                }
                if raw.kind == "int" {
                    if min.ceil() > max.floor() {
                        return Err(invalid("integer range contains no integer"));
                    }
                    #[allow(clippy::cast_possible_truncation)]
                    ParameterKind::Int {
                        min: min.ceil() as i64,
                        max: max.floor() as i64,
                    }
                } else {
                    ParameterKind::Double { min, max }
                }
            }
            "bool" => ParameterKind::Bool,
            "cat" => match raw.values.clone() {
                Some(values) if !values.is_empty() => ParameterKind::Categorical { values },
                _ => return Err(invalid("categorical parameter needs non-empty `values`")),
            },
            other => return Err(SpaceError::UnknownParameterType(other.to_string())),
        };

        let default = match &raw.default {
            Some(value) => Some(
                value_from_json(&kind, value)
                    .ok_or_else(|| invalid("default does not match the declared type"))?,
            ),
            None => None,
        };

        Ok(Self {
            name: raw.name,
            kind,
            default,
            construction_key: raw.construction_key,
        })
    }
}

fn value_from_json(kind: &ParameterKind, value: &Value) -> Option<ParameterValue> {
    match kind {
        ParameterKind::Int { .. } => value.as_i64().map(ParameterValue::Int),
        ParameterKind::Double { .. } => value.as_f64().map(ParameterValue::Double),
        ParameterKind::Bool => value.as_bool().map(ParameterValue::Bool),
        ParameterKind::Categorical { values } => values
            .contains(value)
            .then(|| ParameterValue::Categorical(value.clone())),
    }
}

impl ParameterSpec {
    /// Create a parameter without default or construction key
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            construction_key: None,
        }
    }

    /// Set the default value
    #[must_use]
    pub fn with_default(mut self, default: ParameterValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Lower and upper bound of this parameter in vector space
    ///
    /// Booleans span `[0, 2]` so a uniform draw decodes to either value with
    /// equal probability (decoding treats `< 1` as `false`).
    #[must_use]
    pub fn vector_bounds(&self) -> (f64, f64) {
        match &self.kind {
            #[allow(clippy::cast_precision_loss)]
            ParameterKind::Int { min, max } => (*min as f64, *max as f64),
            ParameterKind::Double { min, max } => (*min, *max),
            ParameterKind::Bool => (0.0, 2.0),
            #[allow(clippy::cast_precision_loss)]
            ParameterKind::Categorical { values } => (0.0, values.len().saturating_sub(1) as f64),
        }
    }

    /// Check that a value belongs to this parameter's domain
    #[must_use]
    pub fn validate(&self, value: &ParameterValue) -> bool {
        match (&self.kind, value) {
            (ParameterKind::Int { min, max }, ParameterValue::Int(v)) => min <= v && v <= max,
            (ParameterKind::Double { min, max }, ParameterValue::Double(v)) => {
                *min <= *v && *v <= *max
            }
            (ParameterKind::Bool, ParameterValue::Bool(_)) => true,
            (ParameterKind::Categorical { values }, ParameterValue::Categorical(v)) => {
                values.contains(v)
            }
            _ => false,
        }
    }

    /// Draw a value uniformly from the domain
    ///
    /// An empty integer range yields its lower bound and an empty categorical
    /// yields `null`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterValue {
        match &self.kind {
            ParameterKind::Int { min, max } => {
                if min < max {
                    ParameterValue::Int(rng.gen_range(*min..=*max))
                } else {
                    ParameterValue::Int(*min)
                }
            }
            ParameterKind::Double { min, max } => {
                if min < max {
                    ParameterValue::Double(rng.gen_range(*min..=*max))
                } else {
                    ParameterValue::Double(*min)
                }
            }
            ParameterKind::Bool => ParameterValue::Bool(rng.gen()),
            ParameterKind::Categorical { values } => ParameterValue::Categorical(
                values.choose(rng).cloned().unwrap_or(Value::Null),
            ),
        }
    }

    /// Encode a value as a vector coordinate
    ///
    /// Returns `None` when the value's variant does not match the kind.
    #[must_use]
    pub fn encode(&self, value: &ParameterValue) -> Option<f64> {
        match (&self.kind, value) {
            #[allow(clippy::cast_precision_loss)]
            (ParameterKind::Int { .. }, ParameterValue::Int(v)) => Some(*v as f64),
            (ParameterKind::Double { .. }, ParameterValue::Double(v)) => Some(*v),
            (ParameterKind::Bool, ParameterValue::Bool(v)) => Some(if *v { 1.0 } else { 0.0 }),
            #[allow(clippy::cast_precision_loss)]
            (ParameterKind::Categorical { values }, ParameterValue::Categorical(v)) => {
                values.iter().position(|c| c == v).map(|i| i as f64)
            }
            _ => None,
        }
    }

    /// Decode a vector coordinate into a value
    ///
    /// Integers truncate toward zero, categoricals round to the nearest index
    /// and clamp into the valid index range. Doubles pass through unchanged.
    #[must_use]
    pub fn decode(&self, coordinate: f64) -> ParameterValue {
        match &self.kind {
            #[allow(clippy::cast_possible_truncation)]
            ParameterKind::Int { .. } => ParameterValue::Int(coordinate as i64),
            ParameterKind::Double { .. } => ParameterValue::Double(coordinate),
            ParameterKind::Bool => ParameterValue::Bool(coordinate >= 1.0),
            ParameterKind::Categorical { values } => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let index = if coordinate <= 0.0 {
                    0
                } else {
                    coordinate.round() as usize
                };
                let value = values
                    .get(index.min(values.len().saturating_sub(1)))
                    .cloned()
                    .unwrap_or(Value::Null);
                ParameterValue::Categorical(value)
            }
        }
    }
}

/// A required capability of a component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredInterface {
    /// Capability tag that must be provided by another component
    pub name: String,
    /// Construction position of the providing component
    #[serde(default)]
    pub construction_key: Option<ConstructionKey>,
}

impl RequiredInterface {
    /// Create a requirement without construction key
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            construction_key: None,
        }
    }
}

/// A building block of the configuration space
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Component {
    /// Fully qualified component name
    pub name: String,
    /// Capability tags this component provides
    #[serde(rename = "providedInterface", default)]
    pub provided: Vec<String>,
    /// Capabilities this component needs from others
    #[serde(rename = "requiredInterface", default, deserialize_with = "null_as_empty")]
    pub required: Vec<RequiredInterface>,
    /// Tunable parameters in declaration order
    #[serde(rename = "parameter", default)]
    pub parameters: Vec<ParameterSpec>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<RequiredInterface>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<RequiredInterface>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parameter name to value, in declaration order
pub type ParameterConfig = IndexMap<String, ParameterValue>;

impl Component {
    /// Create a component with no interfaces and no parameters
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provided: Vec::new(),
            required: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Add a provided capability
    #[must_use]
    pub fn providing(mut self, interface: impl Into<String>) -> Self {
        self.provided.push(interface.into());
        self
    }

    /// Add a required capability
    #[must_use]
    pub fn requiring(mut self, interface: impl Into<String>) -> Self {
        self.required.push(RequiredInterface::new(interface));
        self
    }

    /// Add a parameter
    #[must_use]
    pub fn with_parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Last dotted segment of the name
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Whether this component provides the capability
    #[inline]
    #[must_use]
    pub fn provides(&self, interface: &str) -> bool {
        self.provided.iter().any(|p| p == interface)
    }

    /// Whether this component has tunable parameters
    #[inline]
    #[must_use]
    pub fn has_parameters(&self) -> bool {
        !self.parameters.is_empty()
    }

    /// Default parameter configuration
    ///
    /// Parameters without a declared default get a random value.
    pub fn default_config<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterConfig {
        self.parameters
            .iter()
            .map(|p| {
                let value = p.default.clone().unwrap_or_else(|| {
                    warn!(component = %self.name, parameter = %p.name, "parameter has no default value");
                    p.sample(rng)
                });
                (p.name.clone(), value)
            })
            .collect()
    }

    /// Uniformly random parameter configuration
    pub fn random_config<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterConfig {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.sample(rng)))
            .collect()
    }

    /// Whether `config` assigns a valid value to exactly this component's parameters
    #[must_use]
    pub fn validate_config(&self, config: &ParameterConfig) -> bool {
        config.len() == self.parameters.len()
            && self
                .parameters
                .iter()
                .all(|p| config.get(&p.name).is_some_and(|v| p.validate(v)))
    }
}
