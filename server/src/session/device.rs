//! State of one connected raybot

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use raybot_protocol::models::{OutboundCommand, Topic};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::command::service::CommandService;
use crate::errors::RoboflowError;
use crate::models::command::RaybotCommand;
use crate::session::SessionOptions;

/// Asks the writer to send a close frame and every loop to stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseRequest {
    pub code: u16,
    pub reason: String,
}

/// Latest value published on a telemetry topic
#[derive(Debug, Clone)]
pub struct Telemetry {
    pub data: Value,
    pub received_at: DateTime<Utc>,
}

/// Receiving ends of the session queues
pub struct SessionChannels {
    pub outbound_rx: mpsc::Receiver<String>,
    pub inbound_rx: mpsc::Receiver<Vec<u8>>,
}

pub struct DeviceSession {
    raybot_id: Uuid,
    current_command: Mutex<Option<RaybotCommand>>,
    outbound_tx: mpsc::Sender<String>,
    inbound_tx: mpsc::Sender<Vec<u8>>,
    close_tx: watch::Sender<Option<CloseRequest>>,
    telemetry: Mutex<HashMap<Topic, Telemetry>>,
    pub(crate) commands: Arc<CommandService>,
}

impl DeviceSession {
    pub fn new(
        raybot_id: Uuid,
        commands: Arc<CommandService>,
        options: &SessionOptions,
    ) -> (Arc<Self>, SessionChannels) {
        let (outbound_tx, outbound_rx) = mpsc::channel(options.outbound_capacity.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(options.inbound_capacity.max(1));
        let (close_tx, _) = watch::channel(None);

        let session = Arc::new(Self {
            raybot_id,
            current_command: Mutex::new(None),
            outbound_tx,
            inbound_tx,
            close_tx,
            telemetry: Mutex::new(HashMap::new()),
            commands,
        });
        (
            session,
            SessionChannels {
                outbound_rx,
                inbound_rx,
            },
        )
    }

    pub fn raybot_id(&self) -> Uuid {
        self.raybot_id
    }

    /// Make `command` current and queue it for the writer
    ///
    /// Returns false when the outbound queue is full or closed.
    pub fn send_command(&self, command: RaybotCommand) -> Result<bool, RoboflowError> {
        let frame = serde_json::to_string(&OutboundCommand::new(
            command.id,
            command.command_type,
            &command.inputs,
        ))?;
        let command_id = command.id;
        *self.slot() = Some(command);

        match self.outbound_tx.try_send(frame) {
            Ok(()) => {
                debug!("Queued command {} for raybot {}", command_id, self.raybot_id);
                Ok(true)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "Outbound queue of raybot {} is full, dropping command {}",
                    self.raybot_id, command_id
                );
                Ok(false)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(
                    "Raybot {} is closing, dropping command {}",
                    self.raybot_id, command_id
                );
                Ok(false)
            }
        }
    }

    /// Queue a received frame for the workers, dropping it when the queue is full
    pub fn enqueue_inbound(&self, frame: Vec<u8>) -> bool {
        match self.inbound_tx.try_send(frame) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping frame from raybot {}: {}", self.raybot_id, e);
                false
            }
        }
    }

    /// Request the session to close. Only the first request counts.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        let reason = reason.into();
        let accepted = self.close_tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(CloseRequest {
                code,
                reason: reason.clone(),
            });
            true
        });
        if accepted {
            debug!("Closing raybot {} session ({}: {})", self.raybot_id, code, reason);
        }
    }

    pub fn close_request(&self) -> Option<CloseRequest> {
        self.close_tx.borrow().clone()
    }

    pub fn subscribe_close(&self) -> watch::Receiver<Option<CloseRequest>> {
        self.close_tx.subscribe()
    }

    pub fn current_command(&self) -> Option<RaybotCommand> {
        self.slot().clone()
    }

    /// The current command if its ID is `id`
    pub(crate) fn current_command_matching(&self, id: Uuid) -> Option<RaybotCommand> {
        self.slot().as_ref().filter(|c| c.id == id).cloned()
    }

    /// Replace the current command with a newer copy of itself
    pub(crate) fn refresh_current_command(&self, command: RaybotCommand) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|c| c.id == command.id) {
            *slot = Some(command);
        }
    }

    /// Clear the slot if it holds `id`
    pub(crate) fn clear_current_command(&self, id: Uuid) -> bool {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|c| c.id == id) {
            *slot = None;
            return true;
        }
        false
    }

    pub(crate) fn take_current_command(&self) -> Option<RaybotCommand> {
        self.slot().take()
    }

    pub(crate) fn record_telemetry(&self, topic: Topic, data: Value) {
        let mut telemetry = self.telemetry.lock().unwrap_or_else(|e| e.into_inner());
        telemetry.insert(
            topic,
            Telemetry {
                data,
                received_at: Utc::now(),
            },
        );
    }

    pub fn telemetry(&self, topic: Topic) -> Option<Telemetry> {
        let telemetry = self.telemetry.lock().unwrap_or_else(|e| e.into_inner());
        telemetry.get(&topic).cloned()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<RaybotCommand>> {
        self.current_command.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Resolves once a close was requested, including before the call
pub async fn closed(rx: &mut watch::Receiver<Option<CloseRequest>>) -> CloseRequest {
    loop {
        let current = rx.borrow_and_update().clone();
        if let Some(request) = current {
            return request;
        }
        if rx.changed().await.is_err() {
            return CloseRequest {
                code: axum::extract::ws::close_code::AWAY,
                reason: "session dropped".to_string(),
            };
        }
    }
}
