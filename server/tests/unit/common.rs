//! Shared fixtures

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use uuid::Uuid;

use roboflow::command::poller::{CommandStatusPoller, Options as PollerOptions};
use roboflow::command::service::CommandService;
use roboflow::events::EventBus;
use roboflow::models::command::CommandType;
use roboflow::models::raybot::Raybot;
use roboflow::models::workflow::{Edge, Node, NodeType};
use roboflow::storage::memory::MemoryStore;
use roboflow::storage::Store;

pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub fn store() -> Arc<dyn Store> {
    Arc::new(MemoryStore::new())
}

pub fn command_service(store: &Arc<dyn Store>) -> (Arc<EventBus>, Arc<CommandService>) {
    let events = Arc::new(EventBus::new(64));
    let commands = Arc::new(CommandService::new(store.clone(), events.clone()));
    (events, commands)
}

pub fn poller(store: &Arc<dyn Store>) -> Arc<CommandStatusPoller> {
    Arc::new(CommandStatusPoller::new(
        store.clone(),
        PollerOptions {
            interval: POLL_INTERVAL,
        },
    ))
}

/// A registered raybot, IDLE when `online`, OFFLINE otherwise
pub async fn raybot(store: &Arc<dyn Store>, online: bool) -> Raybot {
    let mut raybot = Raybot::new(Uuid::new_v4(), "raybot");
    if online {
        raybot.mark_connected(Some("127.0.0.1".to_string()));
    }
    store.create_raybot(raybot.clone()).await.unwrap();
    raybot
}

pub fn trigger_node(id: &str) -> Node {
    node(id, NodeType::Trigger, json!({"trigger_type": "ON_DEMAND"}))
}

pub fn trigger_node_with_variables(id: &str, variables: Value) -> Node {
    node(
        id,
        NodeType::Trigger,
        json!({"trigger_type": "ON_DEMAND", "runtime_variables": variables}),
    )
}

/// A CONTROL_RAYBOT node with a static raybot ID
pub fn control_node(id: &str, command_type: CommandType, raybot_id: Uuid, timeout_sec: u64) -> Node {
    node(
        id,
        NodeType::ControlRaybot,
        json!({
            "control_raybot_type": command_type,
            "timeout_sec": timeout_sec,
            "raybot_id": {"type": "STATIC", "static_value": raybot_id},
        }),
    )
}

pub fn node(id: &str, node_type: NodeType, data: Value) -> Node {
    Node {
        id: id.to_string(),
        node_type,
        data,
        position: None,
        label: None,
        initialized: true,
    }
}

pub fn edge(source: &str, target: &str) -> Edge {
    Edge {
        id: format!("{}->{}", source, target),
        source: source.to_string(),
        target: target.to_string(),
        source_handle: None,
        target_handle: None,
        label: None,
    }
}

/// A raybot response frame
pub fn response_frame(id: Uuid, status: &str, data: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({"op": "response", "id": id, "status": status, "data": data}))
        .unwrap()
}

/// Polls `check` until it returns true or `within` elapses
pub async fn eventually<F, Fut>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
