//! Workflow and step execution records

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::RoboflowError;
use crate::models::workflow::{Node, WorkflowDefinition};

/// Named values passed into and out of a step
pub type Variables = HashMap<String, Value>;

/// Workflow execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Canceled
        )
    }
}

/// One run of a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,

    pub workflow_id: Uuid,

    pub status: ExecutionStatus,

    /// Definition frozen at request time
    pub definition: WorkflowDefinition,

    pub inputs: Variables,

    /// Outputs of every completed node, keyed by node ID
    pub outputs: Variables,

    pub error: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    pub fn new(workflow_id: Uuid, definition: WorkflowDefinition, inputs: Variables) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            status: ExecutionStatus::Pending,
            definition,
            inputs,
            outputs: Variables::new(),
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn start(&mut self) -> Result<(), RoboflowError> {
        self.expect(&[ExecutionStatus::Pending], "start")?;
        let now = Utc::now();
        self.status = ExecutionStatus::Running;
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, outputs: Variables) -> Result<(), RoboflowError> {
        self.expect(&[ExecutionStatus::Running], "complete")?;
        self.finish(ExecutionStatus::Completed);
        self.outputs = outputs;
        Ok(())
    }

    pub fn fail(&mut self, error: String) -> Result<(), RoboflowError> {
        self.expect(&[ExecutionStatus::Pending, ExecutionStatus::Running], "fail")?;
        self.finish(ExecutionStatus::Failed);
        self.error = Some(error);
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), RoboflowError> {
        self.expect(&[ExecutionStatus::Pending], "cancel")?;
        self.finish(ExecutionStatus::Canceled);
        Ok(())
    }

    fn finish(&mut self, status: ExecutionStatus) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    fn expect(&self, allowed: &[ExecutionStatus], action: &str) -> Result<(), RoboflowError> {
        if allowed.contains(&self.status) {
            return Ok(());
        }
        Err(RoboflowError::PreconditionFailed(format!(
            "cannot {} workflow execution {} in status {:?}",
            action, self.id, self.status
        )))
    }
}

/// Step execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// An upstream node failed
    Skipped,
}

/// Run-time record of one node in one workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: Uuid,

    pub workflow_execution_id: Uuid,

    pub node: Node,

    pub status: StepStatus,

    pub inputs: Variables,

    pub outputs: Variables,

    pub error: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,
}

impl StepExecution {
    pub fn new(workflow_execution_id: Uuid, node: Node, inputs: Variables) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workflow_execution_id,
            node,
            status: StepStatus::Pending,
            inputs,
            outputs: Variables::new(),
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node.id
    }

    pub fn start(&mut self) -> Result<(), RoboflowError> {
        self.expect(StepStatus::Pending, "start")?;
        let now = Utc::now();
        self.status = StepStatus::Running;
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, inputs: Variables, outputs: Variables) -> Result<(), RoboflowError> {
        self.expect(StepStatus::Running, "complete")?;
        self.finish(StepStatus::Completed);
        self.inputs = inputs;
        self.outputs = outputs;
        Ok(())
    }

    pub fn fail(&mut self, inputs: Option<Variables>, error: String) -> Result<(), RoboflowError> {
        self.expect(StepStatus::Running, "fail")?;
        self.finish(StepStatus::Failed);
        if let Some(inputs) = inputs {
            self.inputs = inputs;
        }
        self.error = Some(error);
        Ok(())
    }

    pub fn skip(&mut self) -> Result<(), RoboflowError> {
        self.expect(StepStatus::Pending, "skip")?;
        self.finish(StepStatus::Skipped);
        Ok(())
    }

    fn finish(&mut self, status: StepStatus) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    fn expect(&self, expected: StepStatus, action: &str) -> Result<(), RoboflowError> {
        if self.status == expected {
            return Ok(());
        }
        Err(RoboflowError::PreconditionFailed(format!(
            "cannot {} step {} in status {:?}",
            action, self.node.id, self.status
        )))
    }
}
