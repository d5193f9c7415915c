//! Error types and outward error classification.

use std::fmt;

use thiserror::Error;

/// Errors returned by control-plane calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlPlaneError {
    /// The addressed resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A resource with the same identity already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The resource (or its parent) is in a state that rejects the call.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Transient provider-side failure.
    #[error("service error: {0}")]
    Service(String),
}

impl ControlPlaneError {
    /// Provider message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            ControlPlaneError::NotFound(msg)
            | ControlPlaneError::AlreadyExists(msg)
            | ControlPlaneError::InvalidState(msg)
            | ControlPlaneError::Service(msg) => msg,
        }
    }

    /// Classification reported when this error ends a run.
    pub fn code(&self) -> ErrorCode {
        match self {
            ControlPlaneError::NotFound(_) => ErrorCode::NotFound,
            ControlPlaneError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            ControlPlaneError::InvalidState(_) => ErrorCode::ResourceConflict,
            ControlPlaneError::Service(_) => ErrorCode::ServiceInternalError,
        }
    }
}

/// Result type for control-plane calls.
pub type Result<T> = std::result::Result<T, ControlPlaneError>;

/// Classification attached to a FAILED run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A create-only field differs between previous and desired state.
    NotUpdatable,
    AlreadyExists,
    NotFound,
    /// Stabilization retry budget exhausted.
    Timeout,
    InvalidRequest,
    ResourceConflict,
    ServiceInternalError,
    InternalFailure,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::NotUpdatable => "NotUpdatable",
            ErrorCode::AlreadyExists => "AlreadyExists",
            ErrorCode::NotFound => "NotFound",
            ErrorCode::Timeout => "Timeout",
            ErrorCode::InvalidRequest => "InvalidRequest",
            ErrorCode::ResourceConflict => "ResourceConflict",
            ErrorCode::ServiceInternalError => "ServiceInternalError",
            ErrorCode::InternalFailure => "InternalFailure",
        };
        f.write_str(name)
    }
}

/// Errors encoding or decoding a progress token.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed progress token: {0}")]
    Malformed(#[from] serde_json::Error),
}
