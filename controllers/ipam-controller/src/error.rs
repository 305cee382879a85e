//! Controller-specific error types.

use hypervisor_client::ActuatorError;
use ipam_engine::IpamError;
use ipam_store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the IPAM Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Engine error
    #[error("IPAM error: {0}")]
    Ipam(#[from] IpamError),

    /// Store error outside an engine operation
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Actuation client could not be built
    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reading or writing the state file failed
    #[error("State file {path}: {source}")]
    StateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
