//! Error types for Agent Hub operations

use crate::planner::PlanError;
use crate::tools::RegistryError;

/// Result type for Agent Hub operations
pub type Result<T> = std::result::Result<T, HubError>;

/// Error types for the orchestration core
///
/// Per-call failures (timeouts, rate limits, tool errors) are never raised
/// through this type; they are recorded as [`crate::tools::ToolStatus`] values.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Registry misuse (duplicate or unknown tool)
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Invalid execution plan
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Text generator failed to open or produce output
    #[error("Generation error: {0}")]
    Generation(String),

    /// The request was cancelled
    #[error("Request cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for HubError {
    fn from(s: String) -> Self {
        HubError::Other(s)
    }
}

impl From<&str> for HubError {
    fn from(s: &str) -> Self {
        HubError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for HubError {
    fn from(err: anyhow::Error) -> Self {
        HubError::Other(err.to_string())
    }
}
