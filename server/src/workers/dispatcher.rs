//! Forwards "command created" events to the command dispatcher

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::events::Event;
use crate::session::dispatcher::CommandDispatcher;

/// Run the dispatcher worker
pub async fn run(
    dispatcher: &CommandDispatcher,
    mut events: mpsc::UnboundedReceiver<Event>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!("Dispatcher worker starting...");

    loop {
        let event = tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Dispatcher worker shutting down...");
                return;
            }
            event = events.recv() => event,
        };

        match event {
            Some(Event::CommandCreated(created)) => match dispatcher.dispatch(&created).await {
                Ok(outcome) => debug!("Command {} dispatch: {:?}", created.command_id, outcome),
                Err(e) => error!("Failed to dispatch command {}: {}", created.command_id, e),
            },
            Some(_) => {}
            None => {
                info!("Event bus closed, dispatcher worker stopping...");
                return;
            }
        }
    }
}
