//! Runs workflow executions as they are created

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::events::Event;
use crate::workflow::service::WorkflowExecutionService;

/// Run the workflow runner worker
///
/// Each execution runs in its own task. Runs still in flight are aborted when
/// the worker shuts down, together with the node tasks they own.
pub async fn run(
    service: Arc<WorkflowExecutionService>,
    mut events: mpsc::UnboundedReceiver<Event>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!("Workflow runner worker starting...");
    let mut runs = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Workflow runner worker shutting down...");
                break;
            }
            Some(finished) = runs.join_next(), if !runs.is_empty() => {
                if let Err(e) = finished {
                    error!("Workflow run task panicked: {}", e);
                }
            }
            event = events.recv() => match event {
                Some(Event::WorkflowExecutionCreated(created)) => {
                    let id = created.workflow_execution_id;
                    let service = service.clone();
                    runs.spawn(async move {
                        match service.run(id).await {
                            Ok(execution) => debug!("Workflow execution {} is {:?}", id, execution.status),
                            Err(e) => warn!("Workflow execution {} failed: {}", id, e),
                        }
                    });
                }
                Some(_) => {}
                None => {
                    info!("Event bus closed, workflow runner stopping...");
                    break;
                }
            },
        }
    }

    runs.shutdown().await;
}
