//! Type specific node logic

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::command::poller::CommandStatusPoller;
use crate::command::service::{CommandService, CreateCommand};
use crate::errors::RoboflowError;
use crate::models::dynamic_value::OutputLookup;
use crate::models::execution::Variables;
use crate::models::workflow::{ControlRaybotData, Node, NodePayload, NodeType};

/// Logic run for one node
#[async_trait]
pub trait NodeTask: Send + Sync {
    fn node_type(&self) -> NodeType;

    /// Produces the inputs `execute` runs with
    ///
    /// References are read through `upstream`, which only sees completed
    /// ancestors.
    fn resolve_inputs(
        &self,
        step_inputs: &Variables,
        upstream: &dyn OutputLookup,
    ) -> Result<Variables, RoboflowError>;

    async fn execute(&self, inputs: Variables) -> Result<Variables, RoboflowError>;
}

/// Builds the task for a node
pub trait TaskFactory: Send + Sync {
    fn create(&self, node: &Node) -> Result<Arc<dyn NodeTask>, RoboflowError>;
}

/// Factory for the node types the server knows how to run
pub struct NodeTaskFactory {
    commands: Arc<CommandService>,
    poller: Arc<CommandStatusPoller>,
}

impl NodeTaskFactory {
    pub fn new(commands: Arc<CommandService>, poller: Arc<CommandStatusPoller>) -> Self {
        Self { commands, poller }
    }
}

impl TaskFactory for NodeTaskFactory {
    fn create(&self, node: &Node) -> Result<Arc<dyn NodeTask>, RoboflowError> {
        match node.payload()? {
            NodePayload::Trigger(_) => Ok(Arc::new(TriggerTask)),
            NodePayload::ControlRaybot(data) => Ok(Arc::new(ControlRaybotTask {
                data,
                commands: self.commands.clone(),
                poller: self.poller.clone(),
            })),
            NodePayload::Empty => Err(RoboflowError::ValidationError(format!(
                "unsupported node type: {}",
                node.node_type
            ))),
        }
    }
}

/// Passes the run inputs through as outputs
pub struct TriggerTask;

#[async_trait]
impl NodeTask for TriggerTask {
    fn node_type(&self) -> NodeType {
        NodeType::Trigger
    }

    fn resolve_inputs(
        &self,
        step_inputs: &Variables,
        _upstream: &dyn OutputLookup,
    ) -> Result<Variables, RoboflowError> {
        Ok(step_inputs.clone())
    }

    async fn execute(&self, inputs: Variables) -> Result<Variables, RoboflowError> {
        Ok(inputs)
    }
}

const RAYBOT_ID_KEY: &str = "raybot_id";
const COMMAND_KEY: &str = "command";
const COMMAND_ID_KEY: &str = "command_id";

/// Sends one command to a raybot and waits for it to finish
pub struct ControlRaybotTask {
    data: ControlRaybotData,
    commands: Arc<CommandService>,
    poller: Arc<CommandStatusPoller>,
}

#[async_trait]
impl NodeTask for ControlRaybotTask {
    fn node_type(&self) -> NodeType {
        NodeType::ControlRaybot
    }

    fn resolve_inputs(
        &self,
        _step_inputs: &Variables,
        upstream: &dyn OutputLookup,
    ) -> Result<Variables, RoboflowError> {
        let raybot_id = self.data.raybot_id.resolve(upstream)?;
        let command = self.data.resolve_command_inputs(upstream)?;

        let mut inputs = Variables::new();
        inputs.insert(RAYBOT_ID_KEY.to_string(), json!(raybot_id));
        inputs.insert(COMMAND_KEY.to_string(), command);
        Ok(inputs)
    }

    async fn execute(&self, inputs: Variables) -> Result<Variables, RoboflowError> {
        let raybot_id: Uuid = inputs
            .get(RAYBOT_ID_KEY)
            .cloned()
            .map(serde_json::from_value::<Uuid>)
            .transpose()?
            .ok_or_else(|| RoboflowError::ValidationError("raybot_id is required".to_string()))?;
        let command_inputs = inputs.get(COMMAND_KEY).cloned().unwrap_or(Value::Null);

        let command = self
            .commands
            .create(CreateCommand {
                raybot_id,
                command_type: self.data.control_raybot_type,
                inputs: command_inputs,
            })
            .await?;

        let command = self
            .poller
            .wait_for_completion(command.id, self.data.timeout())
            .await?;
        info!(
            "Raybot command {} ({}) succeeded on raybot {}",
            command.id, command.command_type, raybot_id
        );

        let mut outputs = match command.outputs {
            Value::Object(map) => map.into_iter().collect(),
            _ => Variables::new(),
        };
        outputs.insert(COMMAND_ID_KEY.to_string(), json!(command.id));
        Ok(outputs)
    }
}
