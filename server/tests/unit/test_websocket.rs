//! Raybot connections over a real WebSocket

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_test::assert_ok;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use roboflow::app::options::{AppOptions, ServerOptions};
use roboflow::app::run::{start, RunningApp};
use roboflow::command::poller::Options as PollerOptions;
use roboflow::command::service::CreateCommand;
use roboflow::models::command::{CommandStatus, CommandType};
use roboflow::models::raybot::{Raybot, RaybotStatus};
use roboflow::session::SessionOptions;
use roboflow::storage::Store;

use crate::common;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn start_app() -> (RunningApp, Uuid) {
    let store = common::store();
    let raybot = Raybot::new(Uuid::new_v4(), "raybot-ws");
    store.create_raybot(raybot.clone()).await.unwrap();

    let options = AppOptions {
        server: ServerOptions {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        session: SessionOptions {
            pong_wait: Duration::from_secs(30),
            ping_period: Duration::from_secs(25),
            ..Default::default()
        },
        poller: PollerOptions {
            interval: Duration::from_millis(20),
        },
        ..Default::default()
    };
    let app = start(options, store).await.unwrap();
    (app, raybot.id)
}

fn url(addr: SocketAddr, raybot_id: Uuid) -> String {
    format!("ws://{}/ws-raybot?id={}", addr, raybot_id)
}

async fn connect(addr: SocketAddr, raybot_id: Uuid) -> Client {
    let (client, _) = connect_async(url(addr, raybot_id)).await.unwrap();
    client
}

/// Next text frame from the server, skipping control frames
async fn next_text(client: &mut Client) -> Value {
    loop {
        let message = tokio::time::timeout(WAIT, client.next())
            .await
            .expect("no frame from server")
            .expect("stream ended")
            .unwrap();
        match message {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message {:?}", other),
        }
    }
}

/// Close code sent by the server
async fn close_code(client: &mut Client) -> u16 {
    loop {
        let message = tokio::time::timeout(WAIT, client.next())
            .await
            .expect("server did not close")
            .expect("stream ended")
            .unwrap();
        if let Message::Close(frame) = message {
            return frame.map(|f| u16::from(f.code)).unwrap_or_default();
        }
    }
}

async fn raybot_status(app: &RunningApp, raybot_id: Uuid) -> (RaybotStatus, bool) {
    let raybot = app.state.store.get_raybot(raybot_id).await.unwrap();
    (raybot.status, raybot.is_online)
}

async fn wait_for_status(app: &RunningApp, raybot_id: Uuid, status: RaybotStatus) -> bool {
    let store: Arc<dyn Store> = app.state.store.clone();
    common::eventually(WAIT, || {
        let store = store.clone();
        async move {
            store
                .get_raybot(raybot_id)
                .await
                .map(|r| r.status == status)
                .unwrap_or(false)
        }
    })
    .await
}

fn reply(id: &Value, status: &str, data: Value) -> Message {
    Message::text(json!({"op": "response", "id": id, "status": status, "data": data}).to_string())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connect_marks_raybot_idle_and_disconnect_offline() {
    let (mut app, raybot_id) = start_app().await;
    assert_eq!(raybot_status(&app, raybot_id).await, (RaybotStatus::Offline, false));

    let mut client = connect(app.addr, raybot_id).await;
    assert!(wait_for_status(&app, raybot_id, RaybotStatus::Idle).await);
    let raybot = app.state.store.get_raybot(raybot_id).await.unwrap();
    assert!(raybot.is_online);
    assert_eq!(raybot.ip_address.as_deref(), Some("127.0.0.1"));
    assert!(app.state.registry.contains(raybot_id).await);

    client.close(None).await.unwrap();
    assert!(wait_for_status(&app, raybot_id, RaybotStatus::Offline).await);
    assert!(!app.state.store.get_raybot(raybot_id).await.unwrap().is_online);
    assert!(!app.state.registry.contains(raybot_id).await);

    assert_ok!(app.shutdown().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_duplicate_and_unknown_raybots_are_rejected() {
    let (mut app, raybot_id) = start_app().await;
    let _client = connect(app.addr, raybot_id).await;
    assert!(wait_for_status(&app, raybot_id, RaybotStatus::Idle).await);

    let status = |err: tungstenite::Error| match err {
        tungstenite::Error::Http(response) => response.status().as_u16(),
        other => panic!("unexpected error {:?}", other),
    };

    let duplicate = connect_async(url(app.addr, raybot_id)).await.unwrap_err();
    assert_eq!(status(duplicate), 409);

    let unknown = connect_async(url(app.addr, Uuid::new_v4())).await.unwrap_err();
    assert_eq!(status(unknown), 404);

    assert_ok!(app.shutdown().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_command_round_trip() {
    let (mut app, raybot_id) = start_app().await;
    let mut client = connect(app.addr, raybot_id).await;
    assert!(wait_for_status(&app, raybot_id, RaybotStatus::Idle).await);

    let command = app
        .state
        .commands
        .create(CreateCommand {
            raybot_id,
            command_type: CommandType::Speak,
            inputs: json!({"text": "hello"}),
        })
        .await
        .unwrap();

    let frame = next_text(&mut client).await;
    assert_eq!(
        frame,
        json!({"id": command.id, "type": "SPEAK", "data": {"text": "hello"}})
    );

    client.send(reply(&frame["id"], "IN_PROGRESS", json!({}))).await.unwrap();
    assert!(wait_for_status(&app, raybot_id, RaybotStatus::Busy).await);

    client.send(reply(&frame["id"], "SUCCESS", json!({}))).await.unwrap();
    let done = app
        .state
        .poller
        .wait_for_completion(command.id, WAIT)
        .await
        .unwrap();
    assert_eq!(done.status, CommandStatus::Succeeded);
    assert!(wait_for_status(&app, raybot_id, RaybotStatus::Idle).await);

    assert_ok!(app.shutdown().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_frame_closes_connection() {
    let (mut app, raybot_id) = start_app().await;
    let mut client = connect(app.addr, raybot_id).await;
    assert!(wait_for_status(&app, raybot_id, RaybotStatus::Idle).await);

    client.send(Message::text("{not json")).await.unwrap();

    assert_eq!(close_code(&mut client).await, 1007);
    assert!(wait_for_status(&app, raybot_id, RaybotStatus::Offline).await);

    assert_ok!(app.shutdown().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_closes_live_sessions() {
    let (mut app, raybot_id) = start_app().await;
    let mut client = connect(app.addr, raybot_id).await;
    assert!(wait_for_status(&app, raybot_id, RaybotStatus::Idle).await);

    assert_ok!(app.shutdown().await);

    assert_eq!(close_code(&mut client).await, 1001);
}
