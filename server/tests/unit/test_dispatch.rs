//! Command dispatch and raybot response handling

use std::sync::Arc;

use axum::extract::ws::close_code;
use raybot_protocol::models::Topic;
use serde_json::{json, Value};
use uuid::Uuid;

use roboflow::command::service::{CommandService, CreateCommand};
use roboflow::events::{CommandCreated, Event, EventBus};
use roboflow::models::command::{CommandStatus, CommandType, RaybotCommand};
use roboflow::models::raybot::RaybotStatus;
use roboflow::session::device::{DeviceSession, SessionChannels};
use roboflow::session::dispatcher::{CommandDispatcher, DispatchOutcome, UNREACHABLE_REASON};
use roboflow::session::registry::SessionRegistry;
use roboflow::session::SessionOptions;
use roboflow::storage::Store;

use crate::common::{self, response_frame as response};

struct Fixture {
    store: Arc<dyn Store>,
    events: Arc<EventBus>,
    commands: Arc<CommandService>,
    registry: Arc<SessionRegistry>,
    dispatcher: CommandDispatcher,
    raybot_id: Uuid,
}

async fn fixture() -> Fixture {
    let store = common::store();
    let (events, commands) = common::command_service(&store);
    let registry = Arc::new(SessionRegistry::new());
    let dispatcher = CommandDispatcher::new(registry.clone(), commands.clone());
    let raybot = common::raybot(&store, true).await;
    Fixture {
        store,
        events,
        commands,
        registry,
        dispatcher,
        raybot_id: raybot.id,
    }
}

impl Fixture {
    async fn connect(&self) -> (Arc<DeviceSession>, SessionChannels) {
        let (session, channels) = DeviceSession::new(
            self.raybot_id,
            self.commands.clone(),
            &SessionOptions::default(),
        );
        self.registry.insert(session.clone()).await.unwrap();
        (session, channels)
    }

    /// Create a command and dispatch the event it published
    async fn create_and_dispatch(
        &self,
        command_type: CommandType,
        inputs: Value,
    ) -> (RaybotCommand, DispatchOutcome) {
        let mut rx = self.events.subscribe();
        let command = self
            .commands
            .create(CreateCommand {
                raybot_id: self.raybot_id,
                command_type,
                inputs,
            })
            .await
            .unwrap();
        let created = match rx.recv().await.unwrap() {
            Event::CommandCreated(created) => created,
            other => panic!("unexpected event {:?}", other),
        };
        let outcome = self.dispatcher.dispatch(&created).await.unwrap();
        (command, outcome)
    }

    async fn command(&self, id: Uuid) -> RaybotCommand {
        self.commands.get(id).await.unwrap()
    }
}

#[tokio::test]
async fn test_dispatch_without_session_fails_command() {
    let f = fixture().await;

    let (command, outcome) = f.create_and_dispatch(CommandType::MoveForward, json!({})).await;
    assert_eq!(outcome, DispatchOutcome::Unreachable);

    let stored = f.command(command.id).await;
    assert_eq!(stored.status, CommandStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some(UNREACHABLE_REASON));
}

#[tokio::test]
async fn test_dispatch_for_unknown_command_errors() {
    let f = fixture().await;
    let _session = f.connect().await;

    let result = f
        .dispatcher
        .dispatch(&CommandCreated {
            raybot_id: f.raybot_id,
            command_id: Uuid::new_v4(),
            command_type: CommandType::Stop,
            inputs: json!({}),
        })
        .await;
    assert!(result.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_dispatch_queues_outbound_frame() {
    let f = fixture().await;
    let (session, mut channels) = f.connect().await;

    let (command, outcome) = f
        .create_and_dispatch(CommandType::MoveToLocation, json!({"location": "A1", "direction": "FORWARD"}))
        .await;
    assert_eq!(outcome, DispatchOutcome::Sent);

    let frame: Value = serde_json::from_str(&channels.outbound_rx.recv().await.unwrap()).unwrap();
    assert_eq!(
        frame,
        json!({
            "id": command.id,
            "type": "MOVE_TO_LOCATION",
            "data": {"location": "A1", "direction": "FORWARD"}
        })
    );
    assert_eq!(session.current_command().map(|c| c.id), Some(command.id));
}

#[tokio::test]
async fn test_in_progress_then_success() {
    let f = fixture().await;
    let (session, _channels) = f.connect().await;
    let (command, _) = f.create_and_dispatch(CommandType::MoveForward, json!({})).await;

    session.handle_frame(&response(command.id, "IN_PROGRESS", json!({}))).await;
    assert_eq!(f.command(command.id).await.status, CommandStatus::InProgress);
    assert_eq!(
        f.store.get_raybot(f.raybot_id).await.unwrap().status,
        RaybotStatus::Busy
    );

    // duplicates are harmless
    session.handle_frame(&response(command.id, "IN_PROGRESS", json!({}))).await;
    assert_eq!(f.command(command.id).await.status, CommandStatus::InProgress);

    session.handle_frame(&response(command.id, "SUCCESS", json!({}))).await;
    let stored = f.command(command.id).await;
    assert_eq!(stored.status, CommandStatus::Succeeded);
    assert!(session.current_command().is_none());
    assert!(session.close_request().is_none());
    assert_eq!(
        f.store.get_raybot(f.raybot_id).await.unwrap().status,
        RaybotStatus::Idle
    );
}

#[tokio::test]
async fn test_success_on_pending_command_closes_with_error() {
    let f = fixture().await;
    let (session, _channels) = f.connect().await;
    let (command, _) = f.create_and_dispatch(CommandType::ScanLocation, json!({})).await;

    session
        .handle_frame(&response(command.id, "SUCCESS", json!({"locations": ["A1", "B2"]})))
        .await;

    assert_eq!(f.command(command.id).await.status, CommandStatus::Pending);
    assert!(session.current_command().is_none());
    assert_eq!(session.close_request().unwrap().code, close_code::ERROR);
}

#[tokio::test]
async fn test_response_without_current_command_closes() {
    let f = fixture().await;
    let (session, _channels) = f.connect().await;

    session
        .handle_frame(&response(Uuid::new_v4(), "SUCCESS", json!({})))
        .await;

    let close = session.close_request().unwrap();
    assert_eq!(close.code, close_code::INVALID);
    assert_eq!(close.reason, "raybot is not processing any command");
}

#[tokio::test]
async fn test_invalid_scan_output_fails_and_closes() {
    let f = fixture().await;
    let (session, _channels) = f.connect().await;
    let (command, _) = f.create_and_dispatch(CommandType::ScanLocation, json!({})).await;

    session
        .handle_frame(&response(command.id, "SUCCESS", json!({"spots": 3})))
        .await;

    let stored = f.command(command.id).await;
    assert_eq!(stored.status, CommandStatus::Failed);
    assert_eq!(
        stored.error.as_deref(),
        Some("invalid command output for success response")
    );
    assert_eq!(session.close_request().unwrap().code, close_code::INVALID);
}

#[tokio::test]
async fn test_error_response_fails_command() {
    let f = fixture().await;
    let (session, _channels) = f.connect().await;
    let (command, _) = f.create_and_dispatch(CommandType::LiftBox, json!({"distance": 500})).await;

    session.handle_frame(&response(command.id, "IN_PROGRESS", json!({}))).await;
    session
        .handle_frame(&response(command.id, "ERROR", json!({"reason": "box too heavy"})))
        .await;

    let stored = f.command(command.id).await;
    assert_eq!(stored.status, CommandStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some("box too heavy"));
    assert_eq!(stored.outputs, json!({"reason": "box too heavy"}));
    assert!(session.current_command().is_none());
    assert!(session.close_request().is_none());
}

#[tokio::test]
async fn test_invalid_error_data_closes() {
    let f = fixture().await;
    let (session, _channels) = f.connect().await;
    let (command, _) = f.create_and_dispatch(CommandType::DropBox, json!({"distance": 500})).await;

    session
        .handle_frame(&response(command.id, "ERROR", json!({"message": 42})))
        .await;

    let stored = f.command(command.id).await;
    assert_eq!(stored.status, CommandStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some("invalid error data"));
    assert_eq!(session.close_request().unwrap().code, close_code::INVALID);
}

#[tokio::test]
async fn test_malformed_response_fails_current_command() {
    let f = fixture().await;
    let (session, _channels) = f.connect().await;
    let (command, _) = f.create_and_dispatch(CommandType::OpenBox, json!({})).await;

    session
        .handle_frame(br#"{"op":"response","id":"not-a-uuid","status":"SUCCESS"}"#)
        .await;

    let stored = f.command(command.id).await;
    assert_eq!(stored.status, CommandStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some("invalid response payload"));
    assert!(session.current_command().is_none());
    assert_eq!(session.close_request().unwrap().code, close_code::INVALID);
}

#[tokio::test]
async fn test_garbage_frame_closes_session() {
    let f = fixture().await;
    let (session, _channels) = f.connect().await;
    let (command, _) = f.create_and_dispatch(CommandType::OpenBox, json!({})).await;

    session.handle_frame(b"not json").await;

    assert_eq!(session.close_request().unwrap().code, close_code::INVALID);
    // only response frames touch the current command
    assert_eq!(f.command(command.id).await.status, CommandStatus::Pending);
}

#[tokio::test]
async fn test_stale_response_is_ignored() {
    let f = fixture().await;
    let (session, _channels) = f.connect().await;
    let (command, _) = f.create_and_dispatch(CommandType::MoveForward, json!({})).await;

    session
        .handle_frame(&response(Uuid::new_v4(), "SUCCESS", json!({})))
        .await;

    assert_eq!(f.command(command.id).await.status, CommandStatus::Pending);
    assert_eq!(session.current_command().map(|c| c.id), Some(command.id));
    assert!(session.close_request().is_none());
}

#[tokio::test]
async fn test_publish_records_telemetry() {
    let f = fixture().await;
    let (session, _channels) = f.connect().await;

    session
        .handle_frame(br#"{"op":"publish","topic":"battery_sensor","data":{"percent":87}}"#)
        .await;

    let telemetry = session.telemetry(Topic::BatterySensor).unwrap();
    assert_eq!(telemetry.data, json!({"percent": 87}));
    assert!(session.telemetry(Topic::WeightSensor).is_none());
    assert!(session.close_request().is_none());
}

#[tokio::test]
async fn test_first_close_request_wins() {
    let f = fixture().await;
    let (session, _channels) = f.connect().await;

    session.close(close_code::AWAY, "shutting down");
    session.close(close_code::ERROR, "later");

    let request = session.close_request().unwrap();
    assert_eq!(request.code, close_code::AWAY);
    assert_eq!(request.reason, "shutting down");
}

#[tokio::test]
async fn test_duplicate_session_is_rejected() {
    let f = fixture().await;
    let (first, _channels) = f.connect().await;

    let (second, _) = DeviceSession::new(f.raybot_id, f.commands.clone(), &SessionOptions::default());
    assert!(f.registry.insert(second.clone()).await.is_err());

    // removing the rejected session leaves the live one registered
    assert!(!f.registry.remove(&second).await);
    assert!(f.registry.contains(f.raybot_id).await);
    assert!(f.registry.remove(&first).await);
    assert!(!f.registry.contains(f.raybot_id).await);
}
