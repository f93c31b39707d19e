//! Socket read and write loops

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{close_code, CloseFrame, Message};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::errors::RoboflowError;
use crate::session::device::{closed, DeviceSession};
use crate::session::SessionOptions;

/// Feed inbound frames to the session until the connection ends
///
/// Only a pong moves the read deadline.
pub async fn read_pump<S, E>(session: Arc<DeviceSession>, mut stream: S, options: &SessionOptions)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let raybot_id = session.raybot_id();
    let mut close_rx = session.subscribe_close();
    let mut deadline = Instant::now() + options.pong_wait;

    loop {
        let next = tokio::select! {
            biased;
            request = closed(&mut close_rx) => {
                debug!("Reader of raybot {} stopping ({})", raybot_id, request.code);
                return;
            }
            next = timeout_at(deadline, stream.next()) => next,
        };

        let message = match next {
            Err(_) => {
                warn!("Raybot {} missed the pong deadline", raybot_id);
                return;
            }
            Ok(None) => {
                info!("Raybot {} closed the stream", raybot_id);
                return;
            }
            Ok(Some(Err(e))) => {
                warn!("Failed to read from raybot {}: {}", raybot_id, e);
                return;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                session.enqueue_inbound(text.as_str().as_bytes().to_vec());
            }
            Message::Binary(bytes) => {
                session.enqueue_inbound(bytes.to_vec());
            }
            Message::Pong(_) => {
                deadline = Instant::now() + options.pong_wait;
            }
            Message::Ping(_) => {}
            Message::Close(frame) => {
                match frame {
                    Some(frame) => info!(
                        "Raybot {} sent close ({}: {})",
                        raybot_id,
                        frame.code,
                        frame.reason.as_str()
                    ),
                    None => info!("Raybot {} sent close", raybot_id),
                }
                return;
            }
        }
    }
}

/// Drain the outbound queue, ping, and send the close frame when asked
pub async fn write_pump<S>(
    session: Arc<DeviceSession>,
    mut sink: S,
    mut outbound_rx: mpsc::Receiver<String>,
    options: SessionOptions,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let raybot_id = session.raybot_id();
    let mut close_rx = session.subscribe_close();
    let mut ping = tokio::time::interval_at(Instant::now() + options.ping_period, options.ping_period);

    loop {
        let message = tokio::select! {
            biased;
            request = closed(&mut close_rx) => {
                let frame = CloseFrame {
                    code: request.code,
                    reason: request.reason.into(),
                };
                if let Err(e) = write(&mut sink, Message::Close(Some(frame)), options.write_wait).await {
                    debug!("Failed to send close to raybot {}: {}", raybot_id, e);
                }
                return;
            }
            next = outbound_rx.recv() => match next {
                Some(text) => Message::Text(text.into()),
                None => return,
            },
            _ = ping.tick() => Message::Ping(Bytes::new()),
        };

        if let Err(e) = write(&mut sink, message, options.write_wait).await {
            warn!("Failed to write to raybot {}: {}", raybot_id, e);
            session.close(close_code::ERROR, "write failed");
        }
    }
}

async fn write<S>(sink: &mut S, message: Message, wait: Duration) -> Result<(), RoboflowError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match timeout(wait, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(RoboflowError::TransportError(e.to_string())),
        Err(_) => Err(RoboflowError::TransportError(format!(
            "write timed out after {:?}",
            wait
        ))),
    }
}
