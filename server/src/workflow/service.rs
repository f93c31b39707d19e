//! Workflow execution lifecycle

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::errors::RoboflowError;
use crate::events::{Event, EventBus, WorkflowExecutionCreated};
use crate::models::execution::{StepExecution, Variables, WorkflowExecution};
use crate::models::workflow::{NodePayload, WorkflowDefinition};
use crate::storage::Store;
use crate::workflow::executor::{GraphExecutor, SchedulingMode};
use crate::workflow::graph::ExecutionGraph;

/// Creates workflow executions and drives them to a terminal status
pub struct WorkflowExecutionService {
    store: Arc<dyn Store>,
    executor: GraphExecutor,
    events: Arc<EventBus>,
    mode: SchedulingMode,
}

impl WorkflowExecutionService {
    pub fn new(
        store: Arc<dyn Store>,
        executor: GraphExecutor,
        events: Arc<EventBus>,
        mode: SchedulingMode,
    ) -> Self {
        Self {
            store,
            executor,
            events,
            mode,
        }
    }

    /// Persist a PENDING execution with one step per node and announce it
    pub async fn create_execution(
        &self,
        workflow_id: Uuid,
        definition: WorkflowDefinition,
        inputs: Variables,
    ) -> Result<WorkflowExecution, RoboflowError> {
        definition.validate()?;

        let trigger = definition.trigger()?;
        let bound = match trigger.payload()? {
            NodePayload::Trigger(data) => data.bind(&inputs)?,
            _ => inputs,
        };
        let trigger_id = trigger.id.clone();

        let execution = WorkflowExecution::new(workflow_id, definition, bound.clone());
        let steps: Vec<StepExecution> = execution
            .definition
            .nodes
            .iter()
            .map(|node| {
                let step_inputs = if node.id == trigger_id {
                    bound.clone()
                } else {
                    Variables::new()
                };
                StepExecution::new(execution.id, node.clone(), step_inputs)
            })
            .collect();

        self.store.create_execution(execution.clone()).await?;
        self.store.create_steps(steps).await?;
        info!(
            "Created workflow execution {} for workflow {}",
            execution.id, workflow_id
        );

        self.events
            .publish(Event::WorkflowExecutionCreated(WorkflowExecutionCreated {
                workflow_execution_id: execution.id,
            }));

        Ok(execution)
    }

    /// Run a PENDING execution to completion
    pub async fn run(&self, execution_id: Uuid) -> Result<WorkflowExecution, RoboflowError> {
        let execution = self
            .store
            .update_execution(execution_id, Box::new(|e| e.start()))
            .await?;
        info!("Running workflow execution {}", execution_id);

        let result = self.walk(&execution).await;

        match result {
            Ok(graph) => {
                let outputs = graph.collect_outputs();
                let execution = self
                    .store
                    .update_execution(execution_id, Box::new(move |e| e.complete(outputs)))
                    .await?;
                info!("Workflow execution {} completed", execution_id);
                Ok(execution)
            }
            Err(err) => {
                let message = err.to_string();
                error!("Workflow execution {} failed: {}", execution_id, message);
                if let Err(e) = self
                    .store
                    .update_execution(execution_id, Box::new(move |e| e.fail(message)))
                    .await
                {
                    error!(
                        "Failed to persist failure of workflow execution {}: {}",
                        execution_id, e
                    );
                }
                Err(err)
            }
        }
    }

    async fn walk(&self, execution: &WorkflowExecution) -> Result<Arc<ExecutionGraph>, RoboflowError> {
        let steps = self.store.list_steps(execution.id).await?;
        let graph = Arc::new(ExecutionGraph::build(&execution.definition.edges, steps));
        self.executor.run(graph.clone(), self.mode).await?;
        Ok(graph)
    }

    /// Cancel an execution that has not started
    pub async fn cancel(&self, execution_id: Uuid) -> Result<WorkflowExecution, RoboflowError> {
        let execution = self
            .store
            .update_execution(execution_id, Box::new(|e| e.cancel()))
            .await?;
        info!("Canceled workflow execution {}", execution_id);
        Ok(execution)
    }

    pub async fn get_execution(&self, execution_id: Uuid) -> Result<WorkflowExecution, RoboflowError> {
        self.store.get_execution(execution_id).await
    }

    pub async fn list_steps(&self, execution_id: Uuid) -> Result<Vec<StepExecution>, RoboflowError> {
        self.store.list_steps(execution_id).await
    }
}
