//! Persistence interfaces
//!
//! Conditional updates take a closure that may reject the change. The change is
//! committed only when the closure returns `Ok`.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::RoboflowError;
use crate::models::command::RaybotCommand;
use crate::models::execution::{StepExecution, WorkflowExecution};
use crate::models::raybot::{Raybot, RaybotStatus};

pub type RaybotUpdate = Box<dyn FnOnce(&mut Raybot) -> Result<(), RoboflowError> + Send>;
pub type CommandUpdate = Box<dyn FnOnce(&mut RaybotCommand) -> Result<(), RoboflowError> + Send>;
pub type StepUpdate = Box<dyn FnOnce(&mut StepExecution) -> Result<(), RoboflowError> + Send>;
pub type ExecutionUpdate =
    Box<dyn FnOnce(&mut WorkflowExecution) -> Result<(), RoboflowError> + Send>;

#[async_trait]
pub trait RaybotStore: Send + Sync {
    async fn create_raybot(&self, raybot: Raybot) -> Result<(), RoboflowError>;

    async fn get_raybot(&self, id: Uuid) -> Result<Raybot, RoboflowError>;

    async fn update_raybot(&self, id: Uuid, update: RaybotUpdate) -> Result<Raybot, RoboflowError>;
}

#[async_trait]
pub trait CommandStore: Send + Sync {
    async fn create_command(&self, command: RaybotCommand) -> Result<(), RoboflowError>;

    async fn get_command(&self, id: Uuid) -> Result<RaybotCommand, RoboflowError>;

    /// Updates a command and the availability of its raybot in one step
    async fn update_command(
        &self,
        id: Uuid,
        raybot_status: RaybotStatus,
        update: CommandUpdate,
    ) -> Result<RaybotCommand, RoboflowError>;
}

#[async_trait]
pub trait StepExecutionStore: Send + Sync {
    async fn create_steps(&self, steps: Vec<StepExecution>) -> Result<(), RoboflowError>;

    async fn get_step(&self, id: Uuid) -> Result<StepExecution, RoboflowError>;

    async fn list_steps(
        &self,
        workflow_execution_id: Uuid,
    ) -> Result<Vec<StepExecution>, RoboflowError>;

    async fn update_step(&self, id: Uuid, update: StepUpdate) -> Result<StepExecution, RoboflowError>;
}

#[async_trait]
pub trait WorkflowExecutionStore: Send + Sync {
    async fn create_execution(&self, execution: WorkflowExecution) -> Result<(), RoboflowError>;

    async fn get_execution(&self, id: Uuid) -> Result<WorkflowExecution, RoboflowError>;

    async fn update_execution(
        &self,
        id: Uuid,
        update: ExecutionUpdate,
    ) -> Result<WorkflowExecution, RoboflowError>;
}

/// Everything the server persists
pub trait Store: RaybotStore + CommandStore + StepExecutionStore + WorkflowExecutionStore {}

impl<T> Store for T where T: RaybotStore + CommandStore + StepExecutionStore + WorkflowExecutionStore {}
