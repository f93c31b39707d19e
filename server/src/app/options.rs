//! Application configuration options

use std::time::Duration;

use crate::command::poller;
use crate::session::SessionOptions;
use crate::workflow::executor::SchedulingMode;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// Raybot session tuning
    pub session: SessionOptions,

    /// Command status poller options
    pub poller: poller::Options,

    /// How workflow graphs are scheduled
    pub scheduling: SchedulingMode,

    /// Capacity of the event bus broadcast channel
    ///
    /// Only broadcast subscribers are bounded by it. The dispatcher and runner
    /// workers read unbounded queues and see every event.
    pub event_capacity: usize,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            server: ServerOptions::default(),
            session: SessionOptions::default(),
            poller: poller::Options::default(),
            scheduling: SchedulingMode::default(),
            event_capacity: 1024,
        }
    }
}

/// Lifecycle options for the server
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}
