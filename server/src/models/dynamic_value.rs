//! Node input values that are either literals or references to upstream outputs

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RoboflowError;

/// Points at an output of another node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReference {
    pub node_id: String,
    pub key: String,
}

/// Looks up outputs of upstream nodes
pub trait OutputLookup {
    fn output(&self, node_id: &str, key: &str) -> Result<Value, RoboflowError>;
}

/// A literal value or a reference to an upstream output
///
/// Serialized as `{"type":"STATIC","static_value":..}` or
/// `{"type":"REFERENCE","reference":{"node_id":..,"key":..}}`.
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicValue<T> {
    Static(T),
    Reference(NodeReference),
}

impl<T> DynamicValue<T>
where
    T: DeserializeOwned + Clone,
{
    /// Returns the literal, or reads and converts the referenced output
    pub fn resolve(&self, lookup: &dyn OutputLookup) -> Result<T, RoboflowError> {
        match self {
            DynamicValue::Static(value) => Ok(value.clone()),
            DynamicValue::Reference(reference) => {
                let raw = lookup.output(&reference.node_id, &reference.key)?;
                serde_json::from_value(raw).map_err(|e| {
                    RoboflowError::ValidationError(format!(
                        "output '{}' of node {} has the wrong type: {}",
                        reference.key, reference.node_id, e
                    ))
                })
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum SourceKind {
    Static,
    Reference,
}

#[derive(Deserialize)]
struct DynamicValueRepr<T> {
    #[serde(rename = "type")]
    kind: SourceKind,
    static_value: Option<T>,
    reference: Option<NodeReference>,
}

impl<'de, T> Deserialize<'de> for DynamicValue<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let repr = DynamicValueRepr::<T>::deserialize(deserializer)?;
        match (repr.kind, repr.static_value, repr.reference) {
            (SourceKind::Static, Some(value), None) => Ok(DynamicValue::Static(value)),
            (SourceKind::Reference, None, Some(reference)) => {
                if reference.node_id.is_empty() || reference.key.is_empty() {
                    return Err(de::Error::custom("reference requires node_id and key"));
                }
                Ok(DynamicValue::Reference(reference))
            }
            (SourceKind::Static, _, _) => Err(de::Error::custom(
                "STATIC value requires static_value and no reference",
            )),
            (SourceKind::Reference, _, _) => Err(de::Error::custom(
                "REFERENCE value requires reference and no static_value",
            )),
        }
    }
}

impl<T> Serialize for DynamicValue<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("DynamicValue", 2)?;
        match self {
            DynamicValue::Static(value) => {
                state.serialize_field("type", "STATIC")?;
                state.serialize_field("static_value", value)?;
            }
            DynamicValue::Reference(reference) => {
                state.serialize_field("type", "REFERENCE")?;
                state.serialize_field("reference", reference)?;
            }
        }
        state.end()
    }
}
