//! Live raybot sessions by raybot ID

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::errors::RoboflowError;
use crate::session::device::DeviceSession;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<DeviceSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, at most one per raybot
    pub async fn insert(&self, session: Arc<DeviceSession>) -> Result<(), RoboflowError> {
        let mut sessions = self.sessions.write().await;
        let id = session.raybot_id();
        if sessions.contains_key(&id) {
            return Err(RoboflowError::AlreadyExists(format!(
                "raybot {} is already connected",
                id
            )));
        }
        sessions.insert(id, session);
        debug!("Registered session for raybot {}", id);
        Ok(())
    }

    /// Unregister `session` unless another session replaced it
    pub async fn remove(&self, session: &Arc<DeviceSession>) -> bool {
        let mut sessions = self.sessions.write().await;
        let id = session.raybot_id();
        match sessions.get(&id) {
            Some(current) if Arc::ptr_eq(current, session) => {
                sessions.remove(&id);
                debug!("Unregistered session for raybot {}", id);
                true
            }
            _ => false,
        }
    }

    pub async fn get(&self, raybot_id: Uuid) -> Option<Arc<DeviceSession>> {
        self.sessions.read().await.get(&raybot_id).cloned()
    }

    pub async fn contains(&self, raybot_id: Uuid) -> bool {
        self.sessions.read().await.contains_key(&raybot_id)
    }

    pub async fn ids(&self) -> Vec<Uuid> {
        self.sessions.read().await.keys().copied().collect()
    }

    /// Ask every live session to close
    pub async fn close_all(&self, code: u16, reason: &str) {
        for session in self.sessions.read().await.values() {
            session.close(code, reason);
        }
    }
}
