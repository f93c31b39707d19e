//! HTTP server setup

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::RoboflowError;
use crate::server::handlers::{health_handler, raybot_handler, version_handler};
use crate::server::state::ServerState;
use crate::server::ws::ws_raybot_handler;

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Raybots
        .route("/raybots/{id}", get(raybot_handler))
        .route("/ws-raybot", get(ws_raybot_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
///
/// Returns the server task and the bound address, port 0 picks a free port.
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(JoinHandle<Result<(), RoboflowError>>, SocketAddr), RoboflowError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| RoboflowError::ServerError(format!("failed to bind {}: {}", addr, e)))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| RoboflowError::ServerError(e.to_string()))?;
    info!("Starting HTTP server on {}", local_addr);

    let handle = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| RoboflowError::ServerError(e.to_string()))
    });

    Ok((handle, local_addr))
}
