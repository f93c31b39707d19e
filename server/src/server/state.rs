//! Server state

use std::sync::Arc;

use crate::session::SessionContext;
use crate::storage::Store;

/// Server state shared across handlers
pub struct ServerState {
    pub store: Arc<dyn Store>,
    pub sessions: SessionContext,
}

impl ServerState {
    pub fn new(store: Arc<dyn Store>, sessions: SessionContext) -> Self {
        Self { store, sessions }
    }
}
