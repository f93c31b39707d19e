//! Main application run loop

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::close_code;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::RoboflowError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::session::registry::SessionRegistry;
use crate::storage::Store;
use crate::workers::{dispatcher, runner};

/// Run the roboflow server until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    store: Arc<dyn Store>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), RoboflowError> {
    let mut app = start(options, store).await?;

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    app.shutdown().await
}

/// A started server and its workers
pub struct RunningApp {
    pub state: Arc<AppState>,
    pub addr: SocketAddr,
    shutdown_manager: ShutdownManager,
}

impl RunningApp {
    pub async fn shutdown(&mut self) -> Result<(), RoboflowError> {
        self.shutdown_manager.shutdown().await
    }
}

/// Build the app state and spawn the workers and the HTTP server
pub async fn start(options: AppOptions, store: Arc<dyn Store>) -> Result<RunningApp, RoboflowError> {
    info!("Initializing Roboflow server...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let state = Arc::new(AppState::init(&options, store));
    let mut shutdown_manager = ShutdownManager::new(
        shutdown_tx.clone(),
        options.lifecycle.clone(),
        state.registry.clone(),
    );

    match init(&options, state.clone(), &shutdown_tx, &mut shutdown_manager).await {
        Ok(addr) => Ok(RunningApp {
            state,
            addr,
            shutdown_manager,
        }),
        Err(e) => {
            error!("Failed to start server: {}", e);
            shutdown_manager.shutdown().await?;
            Err(e)
        }
    }
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    state: Arc<AppState>,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<SocketAddr, RoboflowError> {
    init_dispatcher_worker(state.clone(), shutdown_manager, shutdown_tx.subscribe())?;
    init_runner_worker(state.clone(), shutdown_manager, shutdown_tx.subscribe())?;
    init_http_server(options, state, shutdown_manager, shutdown_tx.subscribe()).await
}

fn init_dispatcher_worker(
    state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), RoboflowError> {
    info!("Initializing dispatcher worker...");

    // subscribe before returning so no event published after start is missed
    let events = state.events.subscribe_queue();
    let command_dispatcher = state.dispatcher.clone();

    let handle = tokio::spawn(async move {
        dispatcher::run(
            command_dispatcher.as_ref(),
            events,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_dispatcher_worker_handle(handle)
}

fn init_runner_worker(
    state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), RoboflowError> {
    info!("Initializing workflow runner worker...");

    let events = state.events.subscribe_queue();
    let workflows = state.workflows.clone();

    let handle = tokio::spawn(async move {
        runner::run(
            workflows,
            events,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_runner_worker_handle(handle)
}

async fn init_http_server(
    options: &AppOptions,
    state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<SocketAddr, RoboflowError> {
    info!("Initializing HTTP server...");

    let server_state = ServerState::new(state.store.clone(), state.sessions.clone());

    let (handle, addr) = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_server_handle(handle)?;
    Ok(addr)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    registry: Arc<SessionRegistry>,
    server_handle: Option<JoinHandle<Result<(), RoboflowError>>>,
    dispatcher_worker_handle: Option<JoinHandle<()>>,
    runner_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    fn new(
        shutdown_tx: broadcast::Sender<()>,
        lifecycle_options: LifecycleOptions,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            registry,
            server_handle: None,
            dispatcher_worker_handle: None,
            runner_worker_handle: None,
        }
    }

    fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), RoboflowError>>,
    ) -> Result<(), RoboflowError> {
        if self.server_handle.is_some() {
            return Err(RoboflowError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    fn with_dispatcher_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), RoboflowError> {
        if self.dispatcher_worker_handle.is_some() {
            return Err(RoboflowError::ShutdownError(
                "dispatcher_handle already set".to_string(),
            ));
        }
        self.dispatcher_worker_handle = Some(handle);
        Ok(())
    }

    fn with_runner_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), RoboflowError> {
        if self.runner_worker_handle.is_some() {
            return Err(RoboflowError::ShutdownError("runner_handle already set".to_string()));
        }
        self.runner_worker_handle = Some(handle);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), RoboflowError> {
        let _ = self.shutdown_tx.send(());

        let max_delay = self.lifecycle_options.max_shutdown_delay;
        match tokio::time::timeout(max_delay, self.shutdown_impl()).await {
            Ok(result) => result,
            Err(_) => {
                error!("Shutdown timed out after {:?}", max_delay);
                Err(RoboflowError::ShutdownError(format!(
                    "shutdown timed out after {:?}",
                    max_delay
                )))
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), RoboflowError> {
        info!("Shutting down Roboflow server...");

        // 1. Live sessions
        self.registry
            .close_all(close_code::AWAY, "server shutting down")
            .await;

        // 2. Dispatcher worker
        if let Some(handle) = self.dispatcher_worker_handle.take() {
            handle.await.map_err(|e| RoboflowError::ShutdownError(e.to_string()))?;
        }

        // 3. Workflow runner
        if let Some(handle) = self.runner_worker_handle.take() {
            handle.await.map_err(|e| RoboflowError::ShutdownError(e.to_string()))?;
        }

        // 4. HTTP server
        if let Some(handle) = self.server_handle.take() {
            handle.await.map_err(|e| RoboflowError::ShutdownError(e.to_string()))??;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
