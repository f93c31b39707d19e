//! Raybot command models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::RoboflowError;

pub use raybot_protocol::models::CommandType;

/// Command lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandStatus::Succeeded | CommandStatus::Failed)
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CommandStatus::Pending => "PENDING",
            CommandStatus::InProgress => "IN_PROGRESS",
            CommandStatus::Succeeded => "SUCCEEDED",
            CommandStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// A single instruction sent to one raybot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaybotCommand {
    pub id: Uuid,

    pub raybot_id: Uuid,

    #[serde(rename = "type")]
    pub command_type: CommandType,

    pub status: CommandStatus,

    /// Normalized inputs for the command type
    pub inputs: Value,

    /// Outputs recorded on a terminal transition
    pub outputs: Value,

    pub error: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,
}

impl RaybotCommand {
    pub fn new(raybot_id: Uuid, command_type: CommandType, inputs: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            raybot_id,
            command_type,
            status: CommandStatus::Pending,
            inputs,
            outputs: json!({}),
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Travel direction for `MOVE_TO_LOCATION`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoveDirection {
    Forward,
    Backward,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoveToLocationInput {
    pub location: String,
    pub direction: MoveDirection,
}

/// Inputs for `LIFT_BOX` and `DROP_BOX`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoxDistanceInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckQrInput {
    pub qr_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpeakInput {
    pub text: String,
}

/// Output recorded for a failed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedOutput {
    pub reason: String,
}

/// Output recorded for a successful `SCAN_LOCATION`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanLocationOutput {
    pub locations: Vec<String>,
}

const MIN_BOX_DISTANCE: i32 = 300;
const MAX_BOX_DISTANCE: i32 = 2000;

/// Validates command inputs for `command_type` and returns them normalized
pub fn validate_inputs(command_type: CommandType, inputs: &Value) -> Result<Value, RoboflowError> {
    let invalid =
        |e: serde_json::Error| RoboflowError::ValidationError(format!("invalid {} inputs: {}", command_type, e));

    match command_type {
        CommandType::MoveToLocation => {
            let input: MoveToLocationInput = serde_json::from_value(inputs.clone()).map_err(invalid)?;
            if input.location.trim().is_empty() {
                return Err(RoboflowError::ValidationError("location is required".to_string()));
            }
            Ok(serde_json::to_value(input)?)
        }
        CommandType::LiftBox | CommandType::DropBox => {
            let input: BoxDistanceInput = match inputs {
                Value::Null => BoxDistanceInput::default(),
                other => serde_json::from_value(other.clone()).map_err(invalid)?,
            };
            if let Some(distance) = input.distance {
                if !(MIN_BOX_DISTANCE..=MAX_BOX_DISTANCE).contains(&distance) {
                    return Err(RoboflowError::ValidationError(format!(
                        "distance must be between {} and {}, got {}",
                        MIN_BOX_DISTANCE, MAX_BOX_DISTANCE, distance
                    )));
                }
            }
            Ok(serde_json::to_value(input)?)
        }
        CommandType::CheckQr => {
            let input: CheckQrInput = serde_json::from_value(inputs.clone()).map_err(invalid)?;
            if input.qr_code.is_empty() {
                return Err(RoboflowError::ValidationError("qr_code is required".to_string()));
            }
            Ok(serde_json::to_value(input)?)
        }
        CommandType::Speak => {
            let input: SpeakInput = serde_json::from_value(inputs.clone()).map_err(invalid)?;
            if input.text.is_empty() {
                return Err(RoboflowError::ValidationError("text is required".to_string()));
            }
            Ok(serde_json::to_value(input)?)
        }
        CommandType::Stop
        | CommandType::MoveForward
        | CommandType::MoveBackward
        | CommandType::OpenBox
        | CommandType::CloseBox
        | CommandType::WaitGetItem
        | CommandType::ScanLocation => match inputs {
            Value::Null => Ok(json!({})),
            Value::Object(map) if map.is_empty() => Ok(json!({})),
            _ => Err(RoboflowError::ValidationError(format!(
                "{} does not take inputs",
                command_type
            ))),
        },
    }
}
