//! Server to raybot frames

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::CommandType;

/// A command sent to a raybot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundCommand {
    pub id: Uuid,

    #[serde(rename = "type")]
    pub command_type: CommandType,

    /// Command inputs, omitted when there are none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl OutboundCommand {
    pub fn new(id: Uuid, command_type: CommandType, inputs: &Value) -> Self {
        let data = match inputs {
            Value::Null => None,
            Value::Object(map) if map.is_empty() => None,
            other => Some(other.clone()),
        };
        Self {
            id,
            command_type,
            data,
        }
    }
}
