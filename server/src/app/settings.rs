//! Settings file and environment overrides

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::options::{AppOptions, ServerOptions};
use crate::command::poller;
use crate::logs::{LogLevel, LogOptions};
use crate::session::SessionOptions;
use crate::workflow::executor::SchedulingMode;

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// `json` or `text`
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Directory for rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// HTTP server configuration
    #[serde(default)]
    pub http_server: HttpServerSettings,

    /// Raybot session configuration
    #[serde(default)]
    pub session: SessionSettings,

    /// Command status polling interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub command_poll_interval_ms: u64,

    #[serde(default)]
    pub scheduling: SchedulingMode,

    /// Raybots known at startup
    #[serde(default)]
    pub raybots: Vec<RaybotSettings>,
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_format: default_log_format(),
            log_dir: None,
            http_server: HttpServerSettings::default(),
            session: SessionSettings::default(),
            command_poll_interval_ms: default_poll_interval_ms(),
            scheduling: SchedulingMode::default(),
            raybots: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for HttpServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Largest accepted inbound message in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_worker_count() -> usize {
    2
}

fn default_max_message_size() -> usize {
    512
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_message_size: default_max_message_size(),
        }
    }
}

/// A raybot registered at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaybotSettings {
    pub id: Uuid,
    pub name: String,
}

impl Settings {
    /// Read settings from a JSON file
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let settings = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse settings file {}", path.display()))?;
        Ok(settings)
    }

    /// Apply `LOG_LEVEL`, `LOG_FORMAT`, `HTTP_SERVER_HOST` and `HTTP_SERVER_PORT`
    pub fn apply_env(self) -> anyhow::Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        if let Some(level) = var("LOG_LEVEL") {
            self.log_level = level.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(format) = var("LOG_FORMAT") {
            match format.as_str() {
                "json" | "text" => self.log_format = format,
                other => anyhow::bail!("LOG_FORMAT must be json or text, got {}", other),
            }
        }
        if let Some(host) = var("HTTP_SERVER_HOST") {
            self.http_server.host = host;
        }
        if let Some(port) = var("HTTP_SERVER_PORT") {
            self.http_server.port = port
                .parse()
                .with_context(|| format!("invalid HTTP_SERVER_PORT {}", port))?;
        }
        Ok(self)
    }

    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            log_level: self.log_level,
            log_dir: self.log_dir.clone(),
            json_format: self.log_format == "json",
            ..Default::default()
        }
    }

    pub fn to_options(&self) -> AppOptions {
        AppOptions {
            server: ServerOptions {
                host: self.http_server.host.clone(),
                port: self.http_server.port,
            },
            session: SessionOptions {
                worker_count: self.session.worker_count,
                max_message_size: self.session.max_message_size,
                ..Default::default()
            },
            poller: poller::Options {
                interval: Duration::from_millis(self.command_poll_interval_ms.max(1)),
            },
            scheduling: self.scheduling,
            ..Default::default()
        }
    }
}
