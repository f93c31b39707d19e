//! In-process pub/sub for server events

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use crate::models::command::CommandType;

pub const COMMAND_CREATED_TOPIC: &str = "raybot_command:created";
pub const WORKFLOW_EXECUTION_CREATED_TOPIC: &str = "workflow_execution:created";

/// A raybot command was persisted and awaits dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandCreated {
    pub raybot_id: Uuid,
    pub command_id: Uuid,
    pub command_type: CommandType,
    pub inputs: Value,
}

/// A workflow execution was persisted and awaits a runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionCreated {
    pub workflow_execution_id: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    CommandCreated(CommandCreated),
    WorkflowExecutionCreated(WorkflowExecutionCreated),
}

impl Event {
    pub fn topic(&self) -> &'static str {
        match self {
            Event::CommandCreated(_) => COMMAND_CREATED_TOPIC,
            Event::WorkflowExecutionCreated(_) => WORKFLOW_EXECUTION_CREATED_TOPIC,
        }
    }
}

/// Broadcast bus, every subscriber sees every event
///
/// Broadcast subscribers that fall more than `capacity` events behind lose
/// the oldest ones. Queue subscribers are unbounded and never lose events,
/// which is what the workers that act on events use.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    queues: Mutex<Vec<mpsc::UnboundedSender<Event>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            queues: Mutex::new(Vec::new()),
        }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: Event) {
        let topic = event.topic();
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|queue| queue.send(event.clone()).is_ok());
        match self.tx.send(event) {
            Ok(receivers) => debug!("Published {} to {} subscribers", topic, receivers),
            Err(_) => debug!("Published {} with no subscribers", topic),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Subscribe with a queue that keeps every event until it is received
    pub fn subscribe_queue(&self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }
}
