//! Engine error types.
//!
//! Every engine operation fails with an [`IpamError`]. The error is a
//! structured value: [`IpamError::code`] classifies it, `Display` renders the
//! message, and `source()` exposes the underlying cause when there is one.

use hypervisor_client::ActuatorError;
use ipam_store::StoreError;
use thiserror::Error;

/// Error classification with stable numeric codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InsufficientCapacity,
    NotFound,
    InvalidParameter,
    PermissionDenied,
    ExternalActuationFailure,
    InvalidState,
    SerializationFailure,
    StoreFailure,
}

impl ErrorCode {
    /// Numeric code for API consumers
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        match self {
            ErrorCode::InsufficientCapacity => 100_001,
            ErrorCode::NotFound => 100_002,
            ErrorCode::InvalidParameter => 100_003,
            ErrorCode::PermissionDenied => 100_004,
            ErrorCode::ExternalActuationFailure => 100_005,
            ErrorCode::SerializationFailure => 100_009,
            ErrorCode::InvalidState => 100_013,
            ErrorCode::StoreFailure => 100_100,
        }
    }
}

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum IpamError {
    /// Subnet, address, interface, floating IP or referenced entity missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller lacks the role or ownership for the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Malformed or conflicting input
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Not enough idle addresses or tags
    #[error("Insufficient capacity: {0}")]
    InsufficientCapacity(String),

    /// Operation not legal in the entity's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The remote apply call failed
    #[error("External actuation failed: {message}")]
    Actuation {
        message: String,
        #[source]
        source: ActuatorError,
    },

    /// A command payload could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store failure other than a missing row
    #[error("Store error: {0}")]
    Store(#[source] StoreError),
}

impl IpamError {
    /// Classification of this error
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            IpamError::NotFound(_) => ErrorCode::NotFound,
            IpamError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            IpamError::InvalidParameter(_) | IpamError::InvalidConfig(_) => ErrorCode::InvalidParameter,
            IpamError::InsufficientCapacity(_) => ErrorCode::InsufficientCapacity,
            IpamError::InvalidState(_) => ErrorCode::InvalidState,
            IpamError::Actuation { .. } => ErrorCode::ExternalActuationFailure,
            IpamError::Serialization(_) => ErrorCode::SerializationFailure,
            IpamError::Store(_) => ErrorCode::StoreFailure,
        }
    }

    /// Whether the remote apply step failed
    #[must_use]
    pub fn is_actuation(&self) -> bool {
        matches!(self, IpamError::Actuation { .. })
    }

    pub(crate) fn actuation(message: impl Into<String>, source: ActuatorError) -> Self {
        IpamError::Actuation {
            message: message.into(),
            source,
        }
    }
}

impl From<StoreError> for IpamError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => IpamError::NotFound(msg),
            other => IpamError::Store(other),
        }
    }
}
