//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::command::poller::CommandStatusPoller;
use crate::command::service::CommandService;
use crate::events::EventBus;
use crate::session::dispatcher::CommandDispatcher;
use crate::session::registry::SessionRegistry;
use crate::session::SessionContext;
use crate::storage::Store;
use crate::workflow::executor::GraphExecutor;
use crate::workflow::service::WorkflowExecutionService;
use crate::workflow::tasks::NodeTaskFactory;

/// Services shared by the server and the workers
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub events: Arc<EventBus>,
    pub registry: Arc<SessionRegistry>,
    pub commands: Arc<CommandService>,
    pub poller: Arc<CommandStatusPoller>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub workflows: Arc<WorkflowExecutionService>,
    pub sessions: SessionContext,
}

impl AppState {
    pub fn init(options: &AppOptions, store: Arc<dyn Store>) -> Self {
        info!("Initializing app state...");

        let events = Arc::new(EventBus::new(options.event_capacity));
        let registry = Arc::new(SessionRegistry::new());
        let commands = Arc::new(CommandService::new(store.clone(), events.clone()));
        let poller = Arc::new(CommandStatusPoller::new(store.clone(), options.poller.clone()));
        let dispatcher = Arc::new(CommandDispatcher::new(registry.clone(), commands.clone()));

        let tasks = Arc::new(NodeTaskFactory::new(commands.clone(), poller.clone()));
        let executor = GraphExecutor::new(store.clone(), tasks);
        let workflows = Arc::new(WorkflowExecutionService::new(
            store.clone(),
            executor,
            events.clone(),
            options.scheduling,
        ));

        let sessions = SessionContext {
            registry: registry.clone(),
            store: store.clone(),
            commands: commands.clone(),
            options: options.session.clone(),
        };

        Self {
            store,
            events,
            registry,
            commands,
            poller,
            dispatcher,
            workflows,
            sessions,
        }
    }
}
