//! Workflow definition models

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::RoboflowError;
use crate::models::command::{validate_inputs, CommandType, MoveDirection};
use crate::models::dynamic_value::{DynamicValue, OutputLookup};
use crate::models::execution::Variables;
use crate::workflow::phases::topological_levels;

/// Nodes and edges authored in the workflow editor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub nodes: Vec<Node>,

    pub edges: Vec<Edge>,
}

/// Node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Empty,
    Trigger,
    ControlRaybot,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeType::Empty => "EMPTY",
            NodeType::Trigger => "TRIGGER",
            NodeType::ControlRaybot => "CONTROL_RAYBOT",
        };
        f.write_str(s)
    }
}

/// A node in the workflow graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique node ID
    pub id: String,

    #[serde(rename = "type")]
    pub node_type: NodeType,

    /// Type specific payload, see [`Node::payload`]
    #[serde(default)]
    pub data: Value,

    /// Editor position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default)]
    pub initialized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Parsed node payload
#[derive(Debug, Clone)]
pub enum NodePayload {
    Empty,
    Trigger(TriggerData),
    ControlRaybot(ControlRaybotData),
}

impl Node {
    pub fn is_trigger(&self) -> bool {
        self.node_type == NodeType::Trigger
    }

    /// Parses `data` according to the node type
    pub fn payload(&self) -> Result<NodePayload, RoboflowError> {
        let invalid = |e: serde_json::Error| {
            RoboflowError::ValidationError(format!(
                "invalid {} data for node {}: {}",
                self.node_type, self.id, e
            ))
        };

        match self.node_type {
            NodeType::Empty => Ok(NodePayload::Empty),
            NodeType::Trigger => Ok(NodePayload::Trigger(
                serde_json::from_value(self.data.clone()).map_err(invalid)?,
            )),
            NodeType::ControlRaybot => {
                let data: ControlRaybotData =
                    serde_json::from_value(self.data.clone()).map_err(invalid)?;
                data.validate()
                    .map_err(|e| RoboflowError::ValidationError(format!("node {}: {}", self.id, e)))?;
                Ok(NodePayload::ControlRaybot(data))
            }
        }
    }
}

/// An edge between two nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,

    pub source: String,

    pub target: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    OnDemand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableType {
    String,
    Number,
}

/// Variable supplied when a workflow run is requested
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeVariable {
    pub key: String,

    pub input_type: VariableType,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerData {
    pub trigger_type: TriggerType,

    #[serde(default)]
    pub runtime_variables: Vec<RuntimeVariable>,
}

impl TriggerData {
    /// Binds run inputs to the declared runtime variables
    ///
    /// Defaults fill in missing values. Undeclared inputs are kept as given.
    pub fn bind(&self, inputs: &Variables) -> Result<Variables, RoboflowError> {
        let mut bound = inputs.clone();

        for variable in &self.runtime_variables {
            let value = match inputs.get(&variable.key) {
                Some(value) if !value.is_null() => value.clone(),
                _ => match &variable.default_value {
                    Some(default) => default.clone(),
                    None if variable.required => {
                        return Err(RoboflowError::ValidationError(format!(
                            "runtime variable '{}' is required",
                            variable.key
                        )));
                    }
                    None => continue,
                },
            };

            let matches = match variable.input_type {
                VariableType::String => value.is_string(),
                VariableType::Number => value.is_number(),
            };
            if !matches {
                return Err(RoboflowError::ValidationError(format!(
                    "runtime variable '{}' must be a {:?}",
                    variable.key, variable.input_type
                )));
            }

            bound.insert(variable.key.clone(), value);
        }

        Ok(bound)
    }
}

/// Payload of a `CONTROL_RAYBOT` node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRaybotData {
    pub control_raybot_type: CommandType,

    pub timeout_sec: u64,

    pub raybot_id: DynamicValue<Uuid>,

    /// Type specific fields, each a [`DynamicValue`]
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct MoveToLocationNodeInput {
    location: DynamicValue<String>,
    direction: DynamicValue<MoveDirection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BoxDistanceNodeInput {
    #[serde(default)]
    distance: Option<DynamicValue<i32>>,
}

#[derive(Debug, Clone, Deserialize)]
struct CheckQrNodeInput {
    qr_code: DynamicValue<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SpeakNodeInput {
    text: DynamicValue<String>,
}

impl ControlRaybotData {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }

    fn validate(&self) -> Result<(), String> {
        if self.timeout_sec == 0 {
            return Err("timeout_sec must be at least 1".to_string());
        }
        // parse only, references are resolved at run time
        match self.control_raybot_type {
            CommandType::MoveToLocation => self.parse_input::<MoveToLocationNodeInput>().map(|_| ()),
            CommandType::LiftBox | CommandType::DropBox => self.box_distance_input().map(|_| ()),
            CommandType::CheckQr => self.parse_input::<CheckQrNodeInput>().map(|_| ()),
            CommandType::Speak => self.parse_input::<SpeakNodeInput>().map(|_| ()),
            _ => Ok(()),
        }
    }

    fn parse_input<T: serde::de::DeserializeOwned>(&self) -> Result<T, String> {
        serde_json::from_value(self.input.clone())
            .map_err(|e| format!("invalid {} input: {}", self.control_raybot_type, e))
    }

    fn box_distance_input(&self) -> Result<BoxDistanceNodeInput, String> {
        if self.input.is_null() {
            return Ok(BoxDistanceNodeInput::default());
        }
        self.parse_input()
    }

    /// Resolves the type specific fields into validated command inputs
    pub fn resolve_command_inputs(&self, lookup: &dyn OutputLookup) -> Result<Value, RoboflowError> {
        let inputs = match self.control_raybot_type {
            CommandType::MoveToLocation => {
                let input: MoveToLocationNodeInput =
                    self.parse_input().map_err(RoboflowError::ValidationError)?;
                json!({
                    "location": input.location.resolve(lookup)?,
                    "direction": input.direction.resolve(lookup)?,
                })
            }
            CommandType::LiftBox | CommandType::DropBox => {
                let input = self
                    .box_distance_input()
                    .map_err(RoboflowError::ValidationError)?;
                match input.distance {
                    Some(distance) => json!({ "distance": distance.resolve(lookup)? }),
                    None => json!({}),
                }
            }
            CommandType::CheckQr => {
                let input: CheckQrNodeInput =
                    self.parse_input().map_err(RoboflowError::ValidationError)?;
                json!({ "qr_code": input.qr_code.resolve(lookup)? })
            }
            CommandType::Speak => {
                let input: SpeakNodeInput =
                    self.parse_input().map_err(RoboflowError::ValidationError)?;
                json!({ "text": input.text.resolve(lookup)? })
            }
            _ => json!({}),
        };

        validate_inputs(self.control_raybot_type, &inputs)
    }
}

impl WorkflowDefinition {
    /// The unique trigger node
    pub fn trigger(&self) -> Result<&Node, RoboflowError> {
        let mut triggers = self.nodes.iter().filter(|n| n.is_trigger());
        match (triggers.next(), triggers.next()) {
            (Some(trigger), None) => Ok(trigger),
            (None, _) => Err(RoboflowError::ValidationError(
                "workflow must have a trigger node".to_string(),
            )),
            (Some(_), Some(_)) => Err(RoboflowError::ValidationError(
                "workflow must have exactly one trigger node".to_string(),
            )),
        }
    }

    /// Checks the structural invariants of the definition
    pub fn validate(&self) -> Result<(), RoboflowError> {
        if self.nodes.is_empty() {
            return Err(RoboflowError::ValidationError(
                "workflow must have at least one node".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(RoboflowError::ValidationError(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
        }

        let trigger = self.trigger()?;

        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            for end in [&edge.source, &edge.target] {
                if !ids.contains(end.as_str()) {
                    return Err(RoboflowError::ValidationError(format!(
                        "edge {} references unknown node {}",
                        edge.id, end
                    )));
                }
            }
            children
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
        }

        // DFS from the trigger
        let mut visited = HashSet::new();
        let mut stack = vec![trigger.id.as_str()];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            if let Some(next) = children.get(id) {
                stack.extend(next.iter().copied());
            }
        }
        if let Some(orphan) = self.nodes.iter().find(|n| !visited.contains(n.id.as_str())) {
            return Err(RoboflowError::ValidationError(format!(
                "node {} is not reachable from the trigger",
                orphan.id
            )));
        }

        let node_ids: Vec<String> = self.nodes.iter().map(|n| n.id.clone()).collect();
        let edges: Vec<(String, String)> = self
            .edges
            .iter()
            .map(|e| (e.source.clone(), e.target.clone()))
            .collect();
        topological_levels(&node_ids, &edges)?;

        for node in &self.nodes {
            node.payload()?;
        }

        Ok(())
    }
}
