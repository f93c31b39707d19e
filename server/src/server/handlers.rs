//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::models::raybot::Raybot;
use crate::server::state::ServerState;
use crate::utils::version_info;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: String,
    pub connected_raybots: usize,
}

pub async fn health_handler(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy",
        service: version.service,
        version: version.version,
        connected_raybots: state.sessions.registry.ids().await.len(),
    })
}

pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Raybot record with its session state
#[derive(Debug, Serialize)]
pub struct RaybotResponse {
    #[serde(flatten)]
    pub raybot: Raybot,
    pub current_command_id: Option<Uuid>,
}

/// `GET /raybots/{id}`
pub async fn raybot_handler(
    Path(raybot_id): Path<Uuid>,
    State(state): State<Arc<ServerState>>,
) -> Response {
    let raybot = match state.store.get_raybot(raybot_id).await {
        Ok(raybot) => raybot,
        Err(e) if e.is_not_found() => {
            return (StatusCode::NOT_FOUND, "raybot not found").into_response();
        }
        Err(e) => {
            error!("Failed to load raybot {}: {}", raybot_id, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    let current_command_id = state
        .sessions
        .registry
        .get(raybot_id)
        .await
        .and_then(|session| session.current_command())
        .map(|command| command.id);

    Json(RaybotResponse {
        raybot,
        current_command_id,
    })
    .into_response()
}
