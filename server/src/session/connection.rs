//! Lifetime of one raybot WebSocket connection

use uuid::Uuid;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tracing::{error, info, warn};

use crate::errors::RoboflowError;
use crate::session::device::DeviceSession;
use crate::session::pumps::{read_pump, write_pump};
use crate::session::worker::spawn_workers;
use crate::session::SessionContext;

/// Serve a raybot until its connection ends
///
/// The raybot is IDLE while connected and OFFLINE afterwards.
pub async fn serve_connection(
    mut socket: WebSocket,
    raybot_id: Uuid,
    ip_address: Option<String>,
    ctx: SessionContext,
) -> Result<(), RoboflowError> {
    let (session, channels) = DeviceSession::new(raybot_id, ctx.commands.clone(), &ctx.options);

    if let Err(e) = ctx.registry.insert(session.clone()).await {
        warn!("Rejecting connection of raybot {}: {}", raybot_id, e);
        reject(&mut socket, close_code::POLICY, "raybot is already connected").await;
        return Err(e);
    }

    if let Err(e) = ctx
        .store
        .update_raybot(
            raybot_id,
            Box::new(move |raybot| {
                raybot.mark_connected(ip_address);
                Ok(())
            }),
        )
        .await
    {
        error!("Failed to mark raybot {} connected: {}", raybot_id, e);
        ctx.registry.remove(&session).await;
        reject(&mut socket, close_code::ERROR, "internal error").await;
        return Err(e);
    }
    info!("Raybot {} connected", raybot_id);

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_pump(
        session.clone(),
        sink,
        channels.outbound_rx,
        ctx.options.clone(),
    ));
    let workers = spawn_workers(session.clone(), channels.inbound_rx, ctx.options.worker_count);

    read_pump(session.clone(), stream, &ctx.options).await;
    session.close(close_code::AWAY, "connection closed");

    if let Err(e) = writer.await {
        error!("Writer of raybot {} panicked: {}", raybot_id, e);
    }
    for worker in workers {
        if let Err(e) = worker.await {
            error!("Worker of raybot {} panicked: {}", raybot_id, e);
        }
    }

    ctx.registry.remove(&session).await;
    if let Err(e) = ctx
        .store
        .update_raybot(
            raybot_id,
            Box::new(|raybot| {
                raybot.mark_disconnected();
                Ok(())
            }),
        )
        .await
    {
        error!("Failed to mark raybot {} disconnected: {}", raybot_id, e);
    }
    info!("Raybot {} disconnected", raybot_id);

    Ok(())
}

async fn reject(socket: &mut WebSocket, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}
