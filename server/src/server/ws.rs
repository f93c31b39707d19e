//! Raybot WebSocket endpoint

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::server::state::ServerState;
use crate::session::connection::serve_connection;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub id: Uuid,
}

/// `GET /ws-raybot?id=<uuid>`
pub async fn ws_raybot_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(state): State<Arc<ServerState>>,
) -> Response {
    let raybot_id = query.id;

    if state.sessions.registry.contains(raybot_id).await {
        warn!("Raybot {} is already connected", raybot_id);
        return (StatusCode::CONFLICT, "raybot is already connected").into_response();
    }

    match state.store.get_raybot(raybot_id).await {
        Ok(_) => {}
        Err(e) if e.is_not_found() => {
            warn!("Unknown raybot {} tried to connect", raybot_id);
            return (StatusCode::NOT_FOUND, "raybot not found").into_response();
        }
        Err(e) => {
            error!("Failed to load raybot {}: {}", raybot_id, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    }

    let ip_address = client_ip(&headers, peer);
    let ctx = state.sessions.clone();
    ws.max_message_size(ctx.options.max_message_size)
        .on_upgrade(move |socket| async move {
            if let Err(e) = serve_connection(socket, raybot_id, Some(ip_address), ctx).await {
                warn!("Connection of raybot {} ended with error: {}", raybot_id, e);
            }
        })
}

/// First `X-Forwarded-For` entry, otherwise the peer address
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}
