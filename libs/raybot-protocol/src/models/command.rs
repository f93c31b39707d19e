//! Command types understood by a raybot

use std::fmt;

use serde::{Deserialize, Serialize};

/// Raybot command type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    Stop,
    MoveForward,
    MoveBackward,
    MoveToLocation,
    OpenBox,
    CloseBox,
    LiftBox,
    DropBox,
    CheckQr,
    WaitGetItem,
    ScanLocation,
    Speak,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Stop => "STOP",
            CommandType::MoveForward => "MOVE_FORWARD",
            CommandType::MoveBackward => "MOVE_BACKWARD",
            CommandType::MoveToLocation => "MOVE_TO_LOCATION",
            CommandType::OpenBox => "OPEN_BOX",
            CommandType::CloseBox => "CLOSE_BOX",
            CommandType::LiftBox => "LIFT_BOX",
            CommandType::DropBox => "DROP_BOX",
            CommandType::CheckQr => "CHECK_QR",
            CommandType::WaitGetItem => "WAIT_GET_ITEM",
            CommandType::ScanLocation => "SCAN_LOCATION",
            CommandType::Speak => "SPEAK",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
