//! Raybot to server frames

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Frame discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Publish,
    Response,
}

impl Operation {
    /// Reads only the `op` field of a frame, ignoring the rest of it
    pub fn peek(frame: &[u8]) -> Option<Operation> {
        #[derive(Deserialize)]
        struct Envelope {
            op: Operation,
        }

        serde_json::from_slice::<Envelope>(frame).ok().map(|e| e.op)
    }
}

/// A frame received from a raybot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum InboundMessage {
    /// Telemetry
    Publish(PublishMessage),

    /// Progress or result of the outstanding command
    Response(ResponseMessage),
}

impl InboundMessage {
    pub fn parse(frame: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(frame)
    }

    pub fn operation(&self) -> Operation {
        match self {
            InboundMessage::Publish(_) => Operation::Publish,
            InboundMessage::Response(_) => Operation::Response,
        }
    }
}

/// Telemetry topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Status,
    RamCpu,
    Log,
    BatterySensor,
    WeightSensor,
    ForwardDistanceSensor,
    BackwardDistanceSensor,
    MovementMotor,
    LiftingMotor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishMessage {
    pub topic: Topic,

    #[serde(default)]
    pub data: Value,
}

/// Status reported by the raybot for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    InProgress,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Command ID
    pub id: Uuid,

    #[serde(default)]
    pub data: Value,

    pub status: ResponseStatus,
}

/// Payload of an `ERROR` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub reason: String,
}

/// Payload of a `SUCCESS` response to `SCAN_LOCATION`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanLocationData {
    pub locations: Vec<String>,
}
