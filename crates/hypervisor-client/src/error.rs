//! Actuation client errors

use thiserror::Error;

/// Errors that can occur when running a command on a hypervisor host
#[derive(Debug, Error)]
pub enum ActuatorError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The control endpoint rejected the command or the command failed
    #[error("Actuation API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (invalid or expired token)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Target selector cannot be rendered (e.g., an empty host group)
    #[error("Invalid target: {0}")]
    InvalidTarget(String),
}
