//! Runs an execution graph

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::{self, JoinError, JoinSet};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::errors::RoboflowError;
use crate::models::execution::Variables;
use crate::storage::Store;
use crate::workflow::graph::{ExecutionGraph, ExecutionNode};
use crate::workflow::tasks::TaskFactory;

/// How ready nodes are scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingMode {
    /// Every node starts as soon as all of its parents completed
    #[default]
    Concurrent,

    /// Dependency levels run in order, one node at a time
    Phased,
}

/// Executes nodes and persists their step records
#[derive(Clone)]
pub struct GraphExecutor {
    store: Arc<dyn Store>,
    tasks: Arc<dyn TaskFactory>,
}

impl GraphExecutor {
    pub fn new(store: Arc<dyn Store>, tasks: Arc<dyn TaskFactory>) -> Self {
        Self { store, tasks }
    }

    pub async fn run(
        &self,
        graph: Arc<ExecutionGraph>,
        mode: SchedulingMode,
    ) -> Result<(), RoboflowError> {
        match mode {
            SchedulingMode::Concurrent => self.execute(graph).await,
            SchedulingMode::Phased => self.execute_phased(graph).await,
        }
    }

    /// Walk the graph from the trigger with one task per node
    ///
    /// Node tasks live in a `JoinSet` owned by this future, so dropping the
    /// run aborts every node still in flight. A node task that panics fails
    /// its step and skips its descendants like any other failure.
    pub async fn execute(&self, graph: Arc<ExecutionGraph>) -> Result<(), RoboflowError> {
        let trigger = graph.trigger()?.id().to_string();

        let mut nodes = JoinSet::new();
        let mut running = HashMap::new();
        self.spawn_node(&mut nodes, &mut running, &graph, trigger);

        let mut errors = Vec::new();
        while let Some(joined) = nodes.join_next_with_id().await {
            match joined {
                Ok((task_id, Ok(ready))) => {
                    running.remove(&task_id);
                    for child in ready {
                        self.spawn_node(&mut nodes, &mut running, &graph, child);
                    }
                }
                Ok((task_id, Err(e))) => {
                    running.remove(&task_id);
                    errors.push(e);
                }
                Err(join_err) => {
                    let Some(node_id) = running.remove(&join_err.id()) else {
                        error!("Unknown node task ended abnormally: {}", join_err);
                        continue;
                    };
                    errors.push(self.abort_node(&graph, &node_id, join_err).await);
                }
            }
        }
        aggregate(errors)
    }

    /// Run dependency levels in order
    ///
    /// The first failure skips every node that has not run yet.
    pub async fn execute_phased(&self, graph: Arc<ExecutionGraph>) -> Result<(), RoboflowError> {
        graph.trigger()?;

        for level in graph.levels()? {
            debug!("Running level {:?}", level);
            for id in level {
                let Some(node) = graph.node(&id) else {
                    continue;
                };
                if !node.try_claim() {
                    continue;
                }
                if let Err(e) = self.execute_node(&graph, node).await {
                    self.skip_unclaimed(&graph).await;
                    return Err(node_failed(&id, e));
                }
            }
        }
        Ok(())
    }

    fn spawn_node(
        &self,
        nodes: &mut JoinSet<Result<Vec<String>, RoboflowError>>,
        running: &mut HashMap<task::Id, String>,
        graph: &Arc<ExecutionGraph>,
        node_id: String,
    ) {
        let handle = nodes.spawn(self.clone().run_node(graph.clone(), node_id.clone()));
        running.insert(handle.id(), node_id);
    }

    /// Run one node and return the children it made ready
    async fn run_node(
        self,
        graph: Arc<ExecutionGraph>,
        node_id: String,
    ) -> Result<Vec<String>, RoboflowError> {
        let Some(node) = graph.node(&node_id) else {
            return Ok(Vec::new());
        };
        if !node.try_claim() {
            debug!("Node {} already executed", node_id);
            return Ok(Vec::new());
        }

        if let Err(e) = self.execute_node(&graph, node).await {
            self.skip_descendants(&graph, &node_id).await;
            return Err(node_failed(&node_id, e));
        }

        Ok(node
            .children()
            .iter()
            .filter(|child| {
                graph
                    .node(child.as_str())
                    .map(ExecutionNode::parent_completed)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    /// Fail the step of a node task that panicked or was cancelled
    async fn abort_node(
        &self,
        graph: &ExecutionGraph,
        node_id: &str,
        join_err: JoinError,
    ) -> RoboflowError {
        let err = if join_err.is_panic() {
            RoboflowError::Internal(format!("node task panicked: {}", join_err))
        } else {
            RoboflowError::Internal(format!("node task cancelled: {}", join_err))
        };

        if let Some(node) = graph.node(node_id) {
            self.fail_step(node.step().id, None, &err).await;
        }
        self.skip_descendants(graph, node_id).await;
        node_failed(node_id, err)
    }

    async fn execute_node(
        &self,
        graph: &ExecutionGraph,
        node: &ExecutionNode,
    ) -> Result<(), RoboflowError> {
        let step = node.step();
        let step_id = step.id;

        self.store
            .update_step(step_id, Box::new(|s| s.start()))
            .await?;
        info!("Node {} ({}) started", node.id(), step.node.node_type);

        let task = match self.tasks.create(&step.node) {
            Ok(task) => task,
            Err(e) => {
                self.fail_step(step_id, None, &e).await;
                return Err(e);
            }
        };

        let inputs = match task.resolve_inputs(&step.inputs, &graph.upstream_of(node.id())) {
            Ok(inputs) => inputs,
            Err(e) => {
                self.fail_step(step_id, None, &e).await;
                return Err(e);
            }
        };

        match task.execute(inputs.clone()).await {
            Ok(outputs) => {
                let persisted = outputs.clone();
                self.store
                    .update_step(step_id, Box::new(move |s| s.complete(inputs, persisted)))
                    .await?;
                node.set_outputs(outputs);
                info!("Node {} completed", node.id());
                Ok(())
            }
            Err(e) => {
                self.fail_step(step_id, Some(inputs), &e).await;
                Err(e)
            }
        }
    }

    async fn fail_step(&self, step_id: Uuid, inputs: Option<Variables>, err: &RoboflowError) {
        let message = err.to_string();
        error!("Step {} failed: {}", step_id, message);
        if let Err(e) = self
            .store
            .update_step(step_id, Box::new(move |s| s.fail(inputs, message)))
            .await
        {
            error!("Failed to persist failure of step {}: {}", step_id, e);
        }
    }

    async fn skip_descendants(&self, graph: &ExecutionGraph, node_id: &str) {
        for id in graph.descendants(node_id) {
            if let Some(node) = graph.node(&id) {
                self.skip(node).await;
            }
        }
    }

    async fn skip_unclaimed(&self, graph: &ExecutionGraph) {
        let ids: Vec<String> = graph.nodes().map(|n| n.id().to_string()).collect();
        for id in ids {
            if let Some(node) = graph.node(&id) {
                self.skip(node).await;
            }
        }
    }

    async fn skip(&self, node: &ExecutionNode) {
        if !node.try_claim() {
            return;
        }
        debug!("Skipping node {}", node.id());
        if let Err(e) = self
            .store
            .update_step(node.step().id, Box::new(|s| s.skip()))
            .await
        {
            error!("Failed to skip node {}: {}", node.id(), e);
        }
    }
}

fn node_failed(node_id: &str, source: RoboflowError) -> RoboflowError {
    RoboflowError::NodeFailed {
        node_id: node_id.to_string(),
        source: Box::new(source),
    }
}

fn aggregate(mut errors: Vec<RoboflowError>) -> Result<(), RoboflowError> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(RoboflowError::MultipleFailures(errors)),
    }
}
