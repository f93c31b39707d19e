//! Finite state machine for raybot commands

use chrono::Utc;
use serde_json::Value;

use crate::errors::RoboflowError;
use crate::models::command::{CommandStatus, FailedOutput, RaybotCommand};
use crate::models::raybot::RaybotStatus;

/// Command event
#[derive(Debug, Clone)]
pub enum CommandEvent {
    /// The raybot started working on the command
    Start,

    /// The raybot finished the command
    Succeed(Value),

    /// The command failed or could not be delivered
    Fail(String),
}

impl CommandEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CommandEvent::Start => "start",
            CommandEvent::Succeed(_) => "succeed",
            CommandEvent::Fail(_) => "fail",
        }
    }

    /// Raybot availability once the event is applied
    pub fn raybot_status(&self) -> RaybotStatus {
        match self {
            CommandEvent::Start => RaybotStatus::Busy,
            CommandEvent::Succeed(_) | CommandEvent::Fail(_) => RaybotStatus::Idle,
        }
    }
}

impl RaybotCommand {
    /// Process an event and transition state
    ///
    /// Rejected transitions leave the command untouched.
    pub fn process(&mut self, event: CommandEvent) -> Result<(), RoboflowError> {
        let now = Utc::now();
        match (self.status, event) {
            (CommandStatus::Pending, CommandEvent::Start) => {
                self.status = CommandStatus::InProgress;
            }
            (CommandStatus::InProgress, CommandEvent::Succeed(outputs)) => {
                self.status = CommandStatus::Succeeded;
                self.outputs = outputs;
                self.completed_at = Some(now);
            }
            (CommandStatus::Pending | CommandStatus::InProgress, CommandEvent::Fail(reason)) => {
                let outputs = serde_json::to_value(FailedOutput {
                    reason: reason.clone(),
                })?;
                self.status = CommandStatus::Failed;
                self.outputs = outputs;
                self.error = Some(reason);
                self.completed_at = Some(now);
            }
            (status, event) => {
                return Err(RoboflowError::PreconditionFailed(format!(
                    "cannot {} raybot command {} in status {}",
                    event.name(),
                    self.id,
                    status
                )));
            }
        }
        self.updated_at = now;
        Ok(())
    }
}
