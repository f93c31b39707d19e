//! Raybot WebSocket sessions and command dispatch

pub mod connection;
pub mod device;
pub mod dispatcher;
pub mod pumps;
pub mod registry;
pub mod response;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use crate::command::service::CommandService;
use crate::session::registry::SessionRegistry;
use crate::storage::Store;

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Capacity of the inbound frame queue
    pub inbound_capacity: usize,

    /// Capacity of the outbound frame queue
    pub outbound_capacity: usize,

    /// Number of tasks handling inbound frames
    pub worker_count: usize,

    /// Bound on a single socket write
    pub write_wait: Duration,

    /// Time allowed between pongs
    pub pong_wait: Duration,

    /// Ping interval, shorter than `pong_wait`
    pub ping_period: Duration,

    /// Largest accepted inbound message in bytes
    pub max_message_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            inbound_capacity: 256,
            outbound_capacity: 256,
            worker_count: 2,
            write_wait: Duration::from_secs(10),
            pong_wait: Duration::from_secs(5),
            ping_period: Duration::from_millis(4500),
            max_message_size: 512,
        }
    }
}

/// What a connection needs beyond its socket
#[derive(Clone)]
pub struct SessionContext {
    pub registry: Arc<SessionRegistry>,
    pub store: Arc<dyn Store>,
    pub commands: Arc<CommandService>,
    pub options: SessionOptions,
}
