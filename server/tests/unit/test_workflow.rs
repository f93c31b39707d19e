//! Workflow runs against in-process raybot sessions

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Barrier;
use tokio::task::JoinHandle;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use roboflow::app::options::AppOptions;
use roboflow::app::state::AppState;
use roboflow::command::poller::Options as PollerOptions;
use roboflow::models::command::{CommandStatus, CommandType};
use roboflow::models::execution::{ExecutionStatus, StepStatus, Variables, WorkflowExecution};
use roboflow::models::workflow::{Edge, Node, NodeType, WorkflowDefinition};
use roboflow::session::device::DeviceSession;
use roboflow::session::SessionOptions;
use roboflow::workers;

use crate::common::{self, control_node, edge, node, response_frame, trigger_node};

const RUN_LIMIT: Duration = Duration::from_secs(10);

/// How the fake raybot answers each command
#[derive(Clone)]
enum Reply {
    Succeed(Value),
    Fail(&'static str),
    Ignore,
}

fn app() -> Arc<AppState> {
    let options = AppOptions {
        poller: PollerOptions {
            interval: common::POLL_INTERVAL,
        },
        ..Default::default()
    };
    Arc::new(AppState::init(&options, common::store()))
}

fn spawn_dispatcher(state: &Arc<AppState>) -> JoinHandle<()> {
    let dispatcher = state.dispatcher.clone();
    let events = state.events.subscribe_queue();
    tokio::spawn(async move {
        workers::dispatcher::run(&dispatcher, events, Box::pin(std::future::pending())).await
    })
}

/// Register a session for `raybot_id` and answer its commands
async fn fake_raybot(
    state: &AppState,
    raybot_id: Uuid,
    reply: Reply,
    barrier: Option<Arc<Barrier>>,
) -> JoinHandle<()> {
    let (session, mut channels) =
        DeviceSession::new(raybot_id, state.commands.clone(), &SessionOptions::default());
    state.registry.insert(session.clone()).await.unwrap();

    tokio::spawn(async move {
        while let Some(frame) = channels.outbound_rx.recv().await {
            let frame: Value = serde_json::from_str(&frame).unwrap();
            let id: Uuid = serde_json::from_value(frame["id"].clone()).unwrap();

            if matches!(reply, Reply::Ignore) {
                continue;
            }
            session
                .handle_frame(&response_frame(id, "IN_PROGRESS", json!({})))
                .await;
            if let Some(barrier) = &barrier {
                barrier.wait().await;
            }
            match &reply {
                Reply::Succeed(data) => {
                    session
                        .handle_frame(&response_frame(id, "SUCCESS", data.clone()))
                        .await
                }
                Reply::Fail(reason) => {
                    session
                        .handle_frame(&response_frame(id, "ERROR", json!({"reason": reason})))
                        .await
                }
                Reply::Ignore => {}
            }
        }
    })
}

fn definition(nodes: Vec<Node>, edges: Vec<Edge>) -> WorkflowDefinition {
    WorkflowDefinition { nodes, edges }
}

async fn run(
    state: &AppState,
    definition: WorkflowDefinition,
    inputs: Variables,
) -> (WorkflowExecution, Result<WorkflowExecution, roboflow::errors::RoboflowError>) {
    let execution = state
        .workflows
        .create_execution(Uuid::new_v4(), definition, inputs)
        .await
        .unwrap();
    let result = tokio::time::timeout(RUN_LIMIT, state.workflows.run(execution.id))
        .await
        .expect("workflow run hung");
    let stored = state.workflows.get_execution(execution.id).await.unwrap();
    (stored, result)
}

async fn step_status(state: &AppState, execution_id: Uuid, node_id: &str) -> StepStatus {
    state
        .workflows
        .list_steps(execution_id)
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.node_id() == node_id)
        .map(|s| s.status)
        .unwrap()
}

#[tokio::test]
async fn test_single_command_succeeds() {
    let state = app();
    let _dispatcher = spawn_dispatcher(&state);
    let raybot = common::raybot(&state.store, true).await;
    let _device = fake_raybot(
        &state,
        raybot.id,
        Reply::Succeed(json!({"locations": ["A1", "A2"]})),
        None,
    )
    .await;

    let (execution, result) = run(
        &state,
        definition(
            vec![
                trigger_node("t"),
                control_node("scan", CommandType::ScanLocation, raybot.id, 5),
            ],
            vec![edge("t", "scan")],
        ),
        Variables::new(),
    )
    .await;

    assert_ok!(result);
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.outputs["scan"]["locations"], json!(["A1", "A2"]));
    assert!(execution.completed_at.is_some());

    let command_id: Uuid = serde_json::from_value(execution.outputs["scan"]["command_id"].clone()).unwrap();
    let command = state.commands.get(command_id).await.unwrap();
    assert_eq!(command.status, CommandStatus::Succeeded);
    assert_eq!(command.raybot_id, raybot.id);
    assert_eq!(step_status(&state, execution.id, "scan").await, StepStatus::Completed);
}

#[tokio::test]
async fn test_offline_raybot_fails_run() {
    let state = app();
    let _dispatcher = spawn_dispatcher(&state);
    let raybot = common::raybot(&state.store, false).await;

    let (execution, result) = run(
        &state,
        definition(
            vec![
                trigger_node("t"),
                control_node("move", CommandType::MoveForward, raybot.id, 5),
            ],
            vec![edge("t", "move")],
        ),
        Variables::new(),
    )
    .await;

    let err = assert_err!(result);
    assert!(err.root().is_precondition_failed());
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.error.unwrap().contains("OFFLINE"));
    assert_eq!(step_status(&state, execution.id, "move").await, StepStatus::Failed);
}

#[tokio::test]
async fn test_unconnected_raybot_fails_command() {
    let state = app();
    let _dispatcher = spawn_dispatcher(&state);
    // IDLE in the store but without a session
    let raybot = common::raybot(&state.store, true).await;

    let (execution, result) = run(
        &state,
        definition(
            vec![
                trigger_node("t"),
                control_node("open", CommandType::OpenBox, raybot.id, 5),
            ],
            vec![edge("t", "open")],
        ),
        Variables::new(),
    )
    .await;

    assert_err!(result);
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.error.unwrap().contains("raybot is not connected"));
}

#[tokio::test]
async fn test_raybot_error_fails_downstream() {
    let state = app();
    let _dispatcher = spawn_dispatcher(&state);
    let raybot = common::raybot(&state.store, true).await;
    let _device = fake_raybot(&state, raybot.id, Reply::Fail("lid jammed"), None).await;

    let (execution, result) = run(
        &state,
        definition(
            vec![
                trigger_node("t"),
                control_node("open", CommandType::OpenBox, raybot.id, 5),
                control_node("close", CommandType::CloseBox, raybot.id, 5),
            ],
            vec![edge("t", "open"), edge("open", "close")],
        ),
        Variables::new(),
    )
    .await;

    assert_err!(result);
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.error.unwrap().contains("lid jammed"));
    assert_eq!(step_status(&state, execution.id, "open").await, StepStatus::Failed);
    assert_eq!(step_status(&state, execution.id, "close").await, StepStatus::Skipped);
}

#[tokio::test]
async fn test_silent_raybot_times_out() {
    let state = app();
    let _dispatcher = spawn_dispatcher(&state);
    let raybot = common::raybot(&state.store, true).await;
    let _device = fake_raybot(&state, raybot.id, Reply::Ignore, None).await;

    let (execution, result) = run(
        &state,
        definition(
            vec![
                trigger_node("t"),
                control_node("move", CommandType::MoveBackward, raybot.id, 1),
            ],
            vec![edge("t", "move")],
        ),
        Variables::new(),
    )
    .await;

    let err = assert_err!(result);
    assert!(err.root().is_timeout());
    assert_eq!(execution.status, ExecutionStatus::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sibling_nodes_run_concurrently() {
    let state = app();
    let _dispatcher = spawn_dispatcher(&state);
    let first = common::raybot(&state.store, true).await;
    let second = common::raybot(&state.store, true).await;

    // neither raybot answers until both commands are in flight
    let barrier = Arc::new(Barrier::new(2));
    let _a = fake_raybot(&state, first.id, Reply::Succeed(json!({})), Some(barrier.clone())).await;
    let _b = fake_raybot(&state, second.id, Reply::Succeed(json!({})), Some(barrier)).await;

    let (execution, result) = run(
        &state,
        definition(
            vec![
                trigger_node("t"),
                control_node("left", CommandType::MoveForward, first.id, 5),
                control_node("right", CommandType::MoveForward, second.id, 5),
            ],
            vec![edge("t", "left"), edge("t", "right")],
        ),
        Variables::new(),
    )
    .await;

    assert_ok!(result);
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(step_status(&state, execution.id, "left").await, StepStatus::Completed);
    assert_eq!(step_status(&state, execution.id, "right").await, StepStatus::Completed);
}

#[tokio::test]
async fn test_raybot_and_inputs_from_runtime_variables() {
    let state = app();
    let _dispatcher = spawn_dispatcher(&state);
    let raybot = common::raybot(&state.store, true).await;
    let _device = fake_raybot(&state, raybot.id, Reply::Succeed(json!({})), None).await;

    let trigger = common::trigger_node_with_variables(
        "t",
        json!([
            {"key": "raybot", "input_type": "STRING", "required": true},
            {"key": "height", "input_type": "NUMBER", "default_value": 800}
        ]),
    );
    let lift = node(
        "lift",
        NodeType::ControlRaybot,
        json!({
            "control_raybot_type": "LIFT_BOX",
            "timeout_sec": 5,
            "raybot_id": {"type": "REFERENCE", "reference": {"node_id": "t", "key": "raybot"}},
            "input": {"distance": {"type": "REFERENCE", "reference": {"node_id": "t", "key": "height"}}}
        }),
    );

    let mut inputs = Variables::new();
    inputs.insert("raybot".to_string(), json!(raybot.id.to_string()));

    let (execution, result) = run(
        &state,
        definition(vec![trigger, lift], vec![edge("t", "lift")]),
        inputs,
    )
    .await;

    assert_ok!(result);
    assert_eq!(execution.inputs["height"], json!(800));

    let command_id: Uuid = serde_json::from_value(execution.outputs["lift"]["command_id"].clone()).unwrap();
    let command = state.commands.get(command_id).await.unwrap();
    assert_eq!(command.raybot_id, raybot.id);
    assert_eq!(command.inputs, json!({"distance": 800}));
}

#[tokio::test]
async fn test_create_execution_validates() {
    let state = app();

    let no_trigger = definition(vec![node("a", NodeType::Empty, json!({}))], vec![]);
    assert_err!(
        state
            .workflows
            .create_execution(Uuid::new_v4(), no_trigger, Variables::new())
            .await
    );

    let required = definition(
        vec![common::trigger_node_with_variables(
            "t",
            json!([{"key": "location", "input_type": "STRING", "required": true}]),
        )],
        vec![],
    );
    let err = assert_err!(
        state
            .workflows
            .create_execution(Uuid::new_v4(), required, Variables::new())
            .await
    );
    assert!(err.to_string().contains("location"));
}

#[tokio::test]
async fn test_cancel_pending_execution() {
    let state = app();
    let execution = state
        .workflows
        .create_execution(
            Uuid::new_v4(),
            definition(vec![trigger_node("t")], vec![]),
            Variables::new(),
        )
        .await
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Pending);

    let canceled = assert_ok!(state.workflows.cancel(execution.id).await);
    assert_eq!(canceled.status, ExecutionStatus::Canceled);

    // a canceled execution cannot start or be canceled again
    assert_err!(state.workflows.run(execution.id).await);
    assert_err!(state.workflows.cancel(execution.id).await);
    let steps = state.workflows.list_steps(execution.id).await.unwrap();
    assert!(steps.iter().all(|s| s.status == StepStatus::Pending));
}

#[tokio::test]
async fn test_runner_worker_runs_created_executions() {
    let state = app();
    let _dispatcher = spawn_dispatcher(&state);
    let raybot = common::raybot(&state.store, true).await;
    let _device = fake_raybot(&state, raybot.id, Reply::Succeed(json!({})), None).await;

    let events = state.events.subscribe_queue();
    let workflows = state.workflows.clone();
    let runner = tokio::spawn(async move {
        workers::runner::run(workflows, events, Box::pin(std::future::pending())).await
    });

    let execution = state
        .workflows
        .create_execution(
            Uuid::new_v4(),
            definition(
                vec![
                    trigger_node("t"),
                    control_node("stop", CommandType::Stop, raybot.id, 5),
                ],
                vec![edge("t", "stop")],
            ),
            Variables::new(),
        )
        .await
        .unwrap();

    let execution_id = execution.id;
    let completed = common::eventually(RUN_LIMIT, || {
        let workflows = state.workflows.clone();
        async move {
            workflows
                .get_execution(execution_id)
                .await
                .map(|e| e.status == ExecutionStatus::Completed)
                .unwrap_or(false)
        }
    })
    .await;
    assert!(completed);

    runner.abort();
}
