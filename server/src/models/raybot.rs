//! Raybot device record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Availability of a raybot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RaybotStatus {
    Offline,
    Idle,
    Busy,
}

impl std::fmt::Display for RaybotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RaybotStatus::Offline => "OFFLINE",
            RaybotStatus::Idle => "IDLE",
            RaybotStatus::Busy => "BUSY",
        };
        f.write_str(s)
    }
}

/// A raybot known to the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Raybot {
    pub id: Uuid,

    pub name: String,

    pub status: RaybotStatus,

    /// Whether a duplex connection is currently open
    pub is_online: bool,

    /// Address the raybot last connected from
    pub ip_address: Option<String>,

    pub last_connected_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Raybot {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            status: RaybotStatus::Offline,
            is_online: false,
            ip_address: None,
            last_connected_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_connected(&mut self, ip_address: Option<String>) {
        let now = Utc::now();
        self.is_online = true;
        self.status = RaybotStatus::Idle;
        self.ip_address = ip_address;
        self.last_connected_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_disconnected(&mut self) {
        self.is_online = false;
        self.status = RaybotStatus::Offline;
        self.updated_at = Utc::now();
    }

    /// Applies a command-driven availability change. Offline raybots stay offline.
    pub fn set_availability(&mut self, status: RaybotStatus) {
        if !self.is_online || status == RaybotStatus::Offline {
            return;
        }
        self.status = status;
        self.updated_at = Utc::now();
    }
}
