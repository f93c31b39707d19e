//! Per-run execution graph
//!
//! Nodes live in one map keyed by node ID and refer to each other by ID.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use serde_json::Value;
use tracing::debug;

use crate::errors::RoboflowError;
use crate::models::dynamic_value::OutputLookup;
use crate::models::execution::{StepExecution, Variables};
use crate::models::workflow::Edge;
use crate::workflow::phases::topological_levels;

/// One step of the run and its links
pub struct ExecutionNode {
    step: StepExecution,
    parents: Vec<String>,
    children: Vec<String>,
    executed: Mutex<bool>,
    pending_parents: AtomicUsize,
    outputs: RwLock<Option<Variables>>,
}

impl ExecutionNode {
    fn new(step: StepExecution) -> Self {
        Self {
            step,
            parents: Vec::new(),
            children: Vec::new(),
            executed: Mutex::new(false),
            pending_parents: AtomicUsize::new(0),
            outputs: RwLock::new(None),
        }
    }

    pub fn id(&self) -> &str {
        self.step.node_id()
    }

    /// Step record as it was when the graph was built
    pub fn step(&self) -> &StepExecution {
        &self.step
    }

    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub fn children(&self) -> &[String] {
        &self.children
    }

    /// Sets the executed flag, returns false if it was already set
    pub fn try_claim(&self) -> bool {
        let mut executed = self.executed.lock().unwrap_or_else(|e| e.into_inner());
        if *executed {
            return false;
        }
        *executed = true;
        true
    }

    pub fn is_claimed(&self) -> bool {
        *self.executed.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records one completed parent, returns true when none remain
    pub fn parent_completed(&self) -> bool {
        let previous = self
            .pending_parents
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        previous == 1
    }

    pub fn outputs(&self) -> Option<Variables> {
        self.outputs.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_outputs(&self, outputs: Variables) {
        *self.outputs.write().unwrap_or_else(|e| e.into_inner()) = Some(outputs);
    }
}

/// Dependency graph over the steps of one workflow execution
pub struct ExecutionGraph {
    nodes: HashMap<String, ExecutionNode>,
}

impl ExecutionGraph {
    /// Link steps along the definition's edges
    ///
    /// Edges naming unknown nodes are skipped.
    pub fn build(edges: &[Edge], steps: Vec<StepExecution>) -> Self {
        let mut nodes: HashMap<String, ExecutionNode> = steps
            .into_iter()
            .map(|step| (step.node_id().to_string(), ExecutionNode::new(step)))
            .collect();

        for edge in edges {
            if !nodes.contains_key(&edge.source) || !nodes.contains_key(&edge.target) {
                debug!(
                    "Ignoring edge {} ({} -> {}), unknown node",
                    edge.id, edge.source, edge.target
                );
                continue;
            }
            if let Some(source) = nodes.get_mut(&edge.source) {
                if source.children.contains(&edge.target) {
                    continue;
                }
                source.children.push(edge.target.clone());
            }
            if let Some(target) = nodes.get_mut(&edge.target) {
                target.parents.push(edge.source.clone());
            }
        }

        for node in nodes.values_mut() {
            node.pending_parents = AtomicUsize::new(node.parents.len());
        }

        Self { nodes }
    }

    pub fn node(&self, id: &str) -> Option<&ExecutionNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ExecutionNode> {
        self.nodes.values()
    }

    /// The unique trigger node
    pub fn trigger(&self) -> Result<&ExecutionNode, RoboflowError> {
        let mut triggers = self.nodes.values().filter(|n| n.step.node.is_trigger());
        match (triggers.next(), triggers.next()) {
            (Some(trigger), None) => Ok(trigger),
            (None, _) => Err(RoboflowError::ValidationError(
                "execution graph has no trigger node".to_string(),
            )),
            (Some(_), Some(_)) => Err(RoboflowError::ValidationError(
                "execution graph has more than one trigger node".to_string(),
            )),
        }
    }

    /// True when `ancestor` can reach `node` along edges
    pub fn is_ancestor(&self, ancestor: &str, node: &str) -> bool {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([node]);
        while let Some(id) = queue.pop_front() {
            let Some(current) = self.nodes.get(id) else {
                continue;
            };
            for parent in &current.parents {
                if parent == ancestor {
                    return true;
                }
                if visited.insert(parent.as_str()) {
                    queue.push_back(parent.as_str());
                }
            }
        }
        false
    }

    /// Every node reachable from `id`, excluding `id`
    pub fn descendants(&self, id: &str) -> Vec<String> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut found = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            for child in &node.children {
                if visited.insert(child.as_str()) {
                    found.push(child.clone());
                    stack.push(child.as_str());
                }
            }
        }
        found
    }

    /// Dependency levels for sequential scheduling
    pub fn levels(&self) -> Result<Vec<Vec<String>>, RoboflowError> {
        let ids: Vec<String> = self.nodes.keys().cloned().collect();
        let edges: Vec<(String, String)> = self
            .nodes
            .values()
            .flat_map(|n| n.children.iter().map(move |c| (n.id().to_string(), c.clone())))
            .collect();
        topological_levels(&ids, &edges)
    }

    /// Outputs of every completed node keyed by node ID
    pub fn collect_outputs(&self) -> Variables {
        self.nodes
            .values()
            .filter_map(|n| {
                n.outputs().map(|outputs| {
                    let object = outputs.into_iter().collect::<serde_json::Map<_, _>>();
                    (n.id().to_string(), Value::Object(object))
                })
            })
            .collect()
    }

    /// Output lookup restricted to completed ancestors of `node_id`
    pub fn upstream_of<'a>(&'a self, node_id: &'a str) -> UpstreamOutputs<'a> {
        UpstreamOutputs {
            graph: self,
            node_id,
        }
    }
}

/// Resolves references against the completed ancestors of one node
pub struct UpstreamOutputs<'a> {
    graph: &'a ExecutionGraph,
    node_id: &'a str,
}

impl OutputLookup for UpstreamOutputs<'_> {
    fn output(&self, node_id: &str, key: &str) -> Result<Value, RoboflowError> {
        if !self.graph.is_ancestor(node_id, self.node_id) {
            return Err(RoboflowError::ValidationError(format!(
                "node {} is not upstream of node {}",
                node_id, self.node_id
            )));
        }
        let outputs = self
            .graph
            .node(node_id)
            .and_then(|n| n.outputs())
            .ok_or_else(|| {
                RoboflowError::PreconditionFailed(format!("node {} has not completed", node_id))
            })?;
        outputs.get(key).cloned().ok_or_else(|| {
            RoboflowError::NotFound(format!("node {} has no output '{}'", node_id, key))
        })
    }
}
