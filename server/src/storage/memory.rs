//! In-memory store

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::RoboflowError;
use crate::models::command::RaybotCommand;
use crate::models::execution::{StepExecution, WorkflowExecution};
use crate::models::raybot::{Raybot, RaybotStatus};
use crate::storage::{
    CommandStore, CommandUpdate, ExecutionUpdate, RaybotStore, RaybotUpdate, StepExecutionStore,
    StepUpdate, WorkflowExecutionStore,
};

/// Store backed by lock-guarded hash maps
///
/// Locks are taken in field order when more than one is needed.
#[derive(Default)]
pub struct MemoryStore {
    raybots: RwLock<HashMap<Uuid, Raybot>>,
    commands: RwLock<HashMap<Uuid, RaybotCommand>>,
    executions: RwLock<HashMap<Uuid, WorkflowExecution>>,
    steps: RwLock<HashMap<Uuid, StepExecution>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(kind: &str, id: Uuid) -> RoboflowError {
    RoboflowError::NotFound(format!("{} {}", kind, id))
}

#[async_trait]
impl RaybotStore for MemoryStore {
    async fn create_raybot(&self, raybot: Raybot) -> Result<(), RoboflowError> {
        let mut raybots = self.raybots.write().unwrap_or_else(|e| e.into_inner());
        if raybots.contains_key(&raybot.id) {
            return Err(RoboflowError::AlreadyExists(format!("raybot {}", raybot.id)));
        }
        raybots.insert(raybot.id, raybot);
        Ok(())
    }

    async fn get_raybot(&self, id: Uuid) -> Result<Raybot, RoboflowError> {
        let raybots = self.raybots.read().unwrap_or_else(|e| e.into_inner());
        raybots.get(&id).cloned().ok_or_else(|| not_found("raybot", id))
    }

    async fn update_raybot(&self, id: Uuid, update: RaybotUpdate) -> Result<Raybot, RoboflowError> {
        let mut raybots = self.raybots.write().unwrap_or_else(|e| e.into_inner());
        let current = raybots.get(&id).ok_or_else(|| not_found("raybot", id))?;
        let mut updated = current.clone();
        update(&mut updated)?;
        raybots.insert(id, updated.clone());
        Ok(updated)
    }
}

#[async_trait]
impl CommandStore for MemoryStore {
    async fn create_command(&self, command: RaybotCommand) -> Result<(), RoboflowError> {
        let mut commands = self.commands.write().unwrap_or_else(|e| e.into_inner());
        if commands.contains_key(&command.id) {
            return Err(RoboflowError::AlreadyExists(format!("raybot command {}", command.id)));
        }
        commands.insert(command.id, command);
        Ok(())
    }

    async fn get_command(&self, id: Uuid) -> Result<RaybotCommand, RoboflowError> {
        let commands = self.commands.read().unwrap_or_else(|e| e.into_inner());
        commands
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("raybot command", id))
    }

    async fn update_command(
        &self,
        id: Uuid,
        raybot_status: RaybotStatus,
        update: CommandUpdate,
    ) -> Result<RaybotCommand, RoboflowError> {
        let mut raybots = self.raybots.write().unwrap_or_else(|e| e.into_inner());
        let mut commands = self.commands.write().unwrap_or_else(|e| e.into_inner());

        let mut command = commands
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("raybot command", id))?;
        update(&mut command)?;

        let raybot = raybots
            .get_mut(&command.raybot_id)
            .ok_or_else(|| not_found("raybot", command.raybot_id))?;
        raybot.set_availability(raybot_status);

        commands.insert(id, command.clone());
        Ok(command)
    }
}

#[async_trait]
impl StepExecutionStore for MemoryStore {
    async fn create_steps(&self, new_steps: Vec<StepExecution>) -> Result<(), RoboflowError> {
        let mut steps = self.steps.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = new_steps.iter().find(|s| steps.contains_key(&s.id)) {
            return Err(RoboflowError::AlreadyExists(format!("step execution {}", existing.id)));
        }
        for step in new_steps {
            steps.insert(step.id, step);
        }
        Ok(())
    }

    async fn get_step(&self, id: Uuid) -> Result<StepExecution, RoboflowError> {
        let steps = self.steps.read().unwrap_or_else(|e| e.into_inner());
        steps.get(&id).cloned().ok_or_else(|| not_found("step execution", id))
    }

    async fn list_steps(
        &self,
        workflow_execution_id: Uuid,
    ) -> Result<Vec<StepExecution>, RoboflowError> {
        let steps = self.steps.read().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<StepExecution> = steps
            .values()
            .filter(|s| s.workflow_execution_id == workflow_execution_id)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.created_at);
        Ok(found)
    }

    async fn update_step(&self, id: Uuid, update: StepUpdate) -> Result<StepExecution, RoboflowError> {
        let mut steps = self.steps.write().unwrap_or_else(|e| e.into_inner());
        let mut step = steps
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("step execution", id))?;
        update(&mut step)?;
        steps.insert(id, step.clone());
        Ok(step)
    }
}

#[async_trait]
impl WorkflowExecutionStore for MemoryStore {
    async fn create_execution(&self, execution: WorkflowExecution) -> Result<(), RoboflowError> {
        let mut executions = self.executions.write().unwrap_or_else(|e| e.into_inner());
        if executions.contains_key(&execution.id) {
            return Err(RoboflowError::AlreadyExists(format!(
                "workflow execution {}",
                execution.id
            )));
        }
        executions.insert(execution.id, execution);
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> Result<WorkflowExecution, RoboflowError> {
        let executions = self.executions.read().unwrap_or_else(|e| e.into_inner());
        executions
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("workflow execution", id))
    }

    async fn update_execution(
        &self,
        id: Uuid,
        update: ExecutionUpdate,
    ) -> Result<WorkflowExecution, RoboflowError> {
        let mut executions = self.executions.write().unwrap_or_else(|e| e.into_inner());
        let mut execution = executions
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("workflow execution", id))?;
        update(&mut execution)?;
        executions.insert(id, execution.clone());
        Ok(execution)
    }
}
