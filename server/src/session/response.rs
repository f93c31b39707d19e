//! Handling of frames received from a raybot

use axum::extract::ws::close_code;
use raybot_protocol::models::{
    ErrorData, InboundMessage, Operation, PublishMessage, ResponseMessage, ResponseStatus,
    ScanLocationData,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::RoboflowError;
use crate::models::command::{CommandStatus, CommandType, RaybotCommand, ScanLocationOutput};
use crate::session::device::DeviceSession;

const INVALID_RESPONSE_PAYLOAD: &str = "invalid response payload";
const INVALID_SUCCESS_OUTPUT: &str = "invalid command output for success response";
const INVALID_ERROR_DATA: &str = "invalid error data";
const NOT_PROCESSING: &str = "raybot is not processing any command";

impl DeviceSession {
    pub async fn handle_frame(&self, frame: &[u8]) {
        let message = match InboundMessage::parse(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!("Raybot {} sent an invalid frame: {}", self.raybot_id(), e);
                if Operation::peek(frame) == Some(Operation::Response) {
                    if let Some(command) = self.take_current_command() {
                        self.mark_failed(command.id, INVALID_RESPONSE_PAYLOAD).await;
                    }
                }
                self.close(close_code::INVALID, "invalid payload");
                return;
            }
        };

        match message {
            InboundMessage::Publish(publish) => self.handle_publish(publish),
            InboundMessage::Response(response) => self.handle_response(response).await,
        }
    }

    fn handle_publish(&self, publish: PublishMessage) {
        debug!("Raybot {} published {:?}", self.raybot_id(), publish.topic);
        self.record_telemetry(publish.topic, publish.data);
    }

    async fn handle_response(&self, response: ResponseMessage) {
        if self.current_command().is_none() {
            error!(
                "Raybot {} sent a {:?} response while not processing any command",
                self.raybot_id(),
                response.status
            );
            self.close(close_code::INVALID, NOT_PROCESSING);
            return;
        }
        let Some(current) = self.current_command_matching(response.id) else {
            warn!(
                "Ignoring stale {:?} response {} from raybot {}",
                response.status,
                response.id,
                self.raybot_id()
            );
            return;
        };

        match response.status {
            ResponseStatus::InProgress => self.handle_in_progress(current).await,
            ResponseStatus::Success => self.handle_success(current, response.data).await,
            ResponseStatus::Error => self.handle_error(current.id, response.data).await,
        }
    }

    async fn handle_in_progress(&self, current: RaybotCommand) {
        if current.status == CommandStatus::InProgress {
            debug!("Duplicate IN_PROGRESS for command {}", current.id);
            return;
        }
        match self.commands.set_in_progress(current.id).await {
            Ok(command) => {
                info!("Raybot command {} is in progress", command.id);
                self.refresh_current_command(command);
            }
            Err(e) if e.is_precondition_failed() => {
                debug!("Ignoring IN_PROGRESS for command {}: {}", current.id, e);
            }
            Err(e) => {
                error!("Failed to start command {}: {}", current.id, e);
                self.close(close_code::ERROR, "internal error");
            }
        }
    }

    async fn handle_success(&self, current: RaybotCommand, data: Value) {
        self.clear_current_command(current.id);

        let outputs = match success_output(current.command_type, data) {
            Ok(outputs) => outputs,
            Err(e) => {
                warn!("Invalid success output for command {}: {}", current.id, e);
                self.mark_failed(current.id, INVALID_SUCCESS_OUTPUT).await;
                self.close(close_code::INVALID, INVALID_SUCCESS_OUTPUT);
                return;
            }
        };

        match self.commands.set_succeeded(current.id, outputs).await {
            Ok(command) => info!("Raybot command {} succeeded", command.id),
            Err(e) => {
                error!("Failed to complete command {}: {}", current.id, e);
                self.close(close_code::ERROR, "internal error");
            }
        }
    }

    async fn handle_error(&self, command_id: Uuid, data: Value) {
        self.clear_current_command(command_id);

        match serde_json::from_value::<ErrorData>(data) {
            Ok(error_data) => self.mark_failed(command_id, &error_data.reason).await,
            Err(e) => {
                warn!("Invalid error data for command {}: {}", command_id, e);
                self.mark_failed(command_id, INVALID_ERROR_DATA).await;
                self.close(close_code::INVALID, INVALID_ERROR_DATA);
            }
        }
    }

    async fn mark_failed(&self, command_id: Uuid, reason: &str) {
        match self.commands.set_failed(command_id, reason.to_string()).await {
            Ok(_) => info!("Raybot command {} failed: {}", command_id, reason),
            Err(e) if e.is_precondition_failed() => {
                debug!("Command {} already finished: {}", command_id, e);
            }
            Err(e) => {
                error!("Failed to fail command {}: {}", command_id, e);
                self.close(close_code::ERROR, "internal error");
            }
        }
    }
}

fn success_output(command_type: CommandType, data: Value) -> Result<Value, RoboflowError> {
    match command_type {
        CommandType::ScanLocation => {
            let data: ScanLocationData = serde_json::from_value(data)?;
            Ok(serde_json::to_value(ScanLocationOutput {
                locations: data.locations,
            })?)
        }
        _ => Ok(json!({})),
    }
}
