//! Routes created commands to connected raybots

use std::sync::Arc;

use tracing::{info, warn};

use crate::command::service::CommandService;
use crate::errors::RoboflowError;
use crate::events::CommandCreated;
use crate::session::registry::SessionRegistry;

pub const UNREACHABLE_REASON: &str = "raybot is not connected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Queued on the raybot's session
    Sent,

    /// The session queue was full
    Dropped,

    /// No session, the command was failed
    Unreachable,
}

pub struct CommandDispatcher {
    registry: Arc<SessionRegistry>,
    commands: Arc<CommandService>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<SessionRegistry>, commands: Arc<CommandService>) -> Self {
        Self { registry, commands }
    }

    pub async fn dispatch(&self, event: &CommandCreated) -> Result<DispatchOutcome, RoboflowError> {
        let Some(session) = self.registry.get(event.raybot_id).await else {
            warn!(
                "Raybot {} is not connected, failing command {}",
                event.raybot_id, event.command_id
            );
            self.commands
                .set_failed(event.command_id, UNREACHABLE_REASON.to_string())
                .await?;
            return Ok(DispatchOutcome::Unreachable);
        };

        let command = self.commands.get(event.command_id).await?;
        if session.send_command(command)? {
            info!(
                "Dispatched command {} ({}) to raybot {}",
                event.command_id, event.command_type, event.raybot_id
            );
            Ok(DispatchOutcome::Sent)
        } else {
            Ok(DispatchOutcome::Dropped)
        }
    }
}
