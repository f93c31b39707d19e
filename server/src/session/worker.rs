//! Inbound frame workers

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::session::device::{closed, DeviceSession};

/// Spawn `count` workers sharing one inbound queue
pub fn spawn_workers(
    session: Arc<DeviceSession>,
    inbound_rx: mpsc::Receiver<Vec<u8>>,
    count: usize,
) -> Vec<JoinHandle<()>> {
    let inbound_rx = Arc::new(Mutex::new(inbound_rx));
    (0..count.max(1))
        .map(|worker| {
            let session = session.clone();
            let inbound_rx = inbound_rx.clone();
            tokio::spawn(async move { run_worker(worker, session, inbound_rx).await })
        })
        .collect()
}

async fn run_worker(
    worker: usize,
    session: Arc<DeviceSession>,
    inbound_rx: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
) {
    let mut close_rx = session.subscribe_close();

    loop {
        let frame = tokio::select! {
            biased;
            _ = closed(&mut close_rx) => break,
            frame = async { inbound_rx.lock().await.recv().await } => frame,
        };
        let Some(frame) = frame else {
            break;
        };
        session.handle_frame(&frame).await;
    }

    debug!("Worker {} of raybot {} stopped", worker, session.raybot_id());
}
