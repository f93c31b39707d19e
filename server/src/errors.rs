//! Error types for the roboflow server

use thiserror::Error;

/// Main error type for the roboflow server
#[derive(Error, Debug)]
pub enum RoboflowError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Raybot unreachable: {0}")]
    Unreachable(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Raybot command failed: {0}")]
    CommandFailed(String),

    #[error("Node {node_id} failed: {source}")]
    NodeFailed {
        node_id: String,
        #[source]
        source: Box<RoboflowError>,
    },

    #[error("{} nodes failed: {}", .0.len(), join_errors(.0))]
    MultipleFailures(Vec<RoboflowError>),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoboflowError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RoboflowError::NotFound(_))
    }

    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, RoboflowError::PreconditionFailed(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RoboflowError::Timeout(_))
    }

    /// Unwraps `NodeFailed` down to the error raised by the node itself
    pub fn root(&self) -> &RoboflowError {
        match self {
            RoboflowError::NodeFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<anyhow::Error> for RoboflowError {
    fn from(err: anyhow::Error) -> Self {
        RoboflowError::Internal(format!("{:#}", err))
    }
}

fn join_errors(errors: &[RoboflowError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
