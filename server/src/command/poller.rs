//! Waits for a raybot command to reach a terminal status

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::errors::RoboflowError;
use crate::models::command::{CommandStatus, RaybotCommand};
use crate::storage::Store;

/// Poller options
#[derive(Debug, Clone)]
pub struct Options {
    /// Delay between store reads
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

/// Observes command status without changing it
pub struct CommandStatusPoller {
    store: Arc<dyn Store>,
    options: Options,
}

impl CommandStatusPoller {
    pub fn new(store: Arc<dyn Store>, options: Options) -> Self {
        Self { store, options }
    }

    /// Returns the command once SUCCEEDED, an error once FAILED or when `timeout` elapses
    pub async fn wait_for_completion(
        &self,
        command_id: Uuid,
        timeout: Duration,
    ) -> Result<RaybotCommand, RoboflowError> {
        match tokio::time::timeout(timeout, self.poll(command_id)).await {
            Ok(result) => result,
            Err(_) => Err(RoboflowError::Timeout(format!(
                "raybot command {} did not complete within {:?}",
                command_id, timeout
            ))),
        }
    }

    async fn poll(&self, command_id: Uuid) -> Result<RaybotCommand, RoboflowError> {
        let mut ticker = tokio::time::interval(self.options.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let command = self.store.get_command(command_id).await?;
            match command.status {
                CommandStatus::Succeeded => return Ok(command),
                CommandStatus::Failed => {
                    return Err(RoboflowError::CommandFailed(
                        command
                            .error
                            .unwrap_or_else(|| "raybot command failed".to_string()),
                    ));
                }
                status => debug!("Raybot command {} is {}", command_id, status),
            }
        }
    }
}
