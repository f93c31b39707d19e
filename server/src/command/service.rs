//! Command creation and status transitions

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::command::fsm::CommandEvent;
use crate::errors::RoboflowError;
use crate::events::{CommandCreated, Event, EventBus};
use crate::models::command::{validate_inputs, CommandType, RaybotCommand};
use crate::models::raybot::RaybotStatus;
use crate::storage::Store;

/// Request to create a raybot command
#[derive(Debug, Clone)]
pub struct CreateCommand {
    pub raybot_id: Uuid,
    pub command_type: CommandType,
    pub inputs: Value,
}

/// Owns every status change of a raybot command
pub struct CommandService {
    store: Arc<dyn Store>,
    events: Arc<EventBus>,
}

impl CommandService {
    pub fn new(store: Arc<dyn Store>, events: Arc<EventBus>) -> Self {
        Self { store, events }
    }

    pub async fn get(&self, id: Uuid) -> Result<RaybotCommand, RoboflowError> {
        self.store.get_command(id).await
    }

    /// Create a command for an eligible raybot and announce it
    pub async fn create(&self, request: CreateCommand) -> Result<RaybotCommand, RoboflowError> {
        let inputs = validate_inputs(request.command_type, &request.inputs)?;

        let raybot = self.store.get_raybot(request.raybot_id).await?;
        match raybot.status {
            RaybotStatus::Offline => {
                return Err(RoboflowError::PreconditionFailed(format!(
                    "raybot {} is OFFLINE",
                    raybot.id
                )));
            }
            RaybotStatus::Busy if request.command_type != CommandType::Stop => {
                return Err(RoboflowError::PreconditionFailed(format!(
                    "raybot {} is BUSY, only STOP is accepted",
                    raybot.id
                )));
            }
            _ => {}
        }

        let command = RaybotCommand::new(raybot.id, request.command_type, inputs);
        self.store.create_command(command.clone()).await?;
        info!(
            "Created raybot command {} ({}) for raybot {}",
            command.id, command.command_type, command.raybot_id
        );

        self.events.publish(Event::CommandCreated(CommandCreated {
            raybot_id: command.raybot_id,
            command_id: command.id,
            command_type: command.command_type,
            inputs: command.inputs.clone(),
        }));

        Ok(command)
    }

    /// PENDING -> IN_PROGRESS, raybot becomes BUSY
    pub async fn set_in_progress(&self, id: Uuid) -> Result<RaybotCommand, RoboflowError> {
        self.apply(id, CommandEvent::Start).await
    }

    /// IN_PROGRESS -> SUCCEEDED, raybot becomes IDLE
    pub async fn set_succeeded(&self, id: Uuid, outputs: Value) -> Result<RaybotCommand, RoboflowError> {
        self.apply(id, CommandEvent::Succeed(outputs)).await
    }

    /// PENDING or IN_PROGRESS -> FAILED, raybot becomes IDLE
    pub async fn set_failed(&self, id: Uuid, reason: String) -> Result<RaybotCommand, RoboflowError> {
        self.apply(id, CommandEvent::Fail(reason)).await
    }

    async fn apply(&self, id: Uuid, event: CommandEvent) -> Result<RaybotCommand, RoboflowError> {
        let name = event.name();
        let raybot_status = event.raybot_status();
        let command = self
            .store
            .update_command(id, raybot_status, Box::new(move |cmd| cmd.process(event)))
            .await?;
        debug!("Raybot command {} {} -> {}", id, name, command.status);
        Ok(command)
    }
}
