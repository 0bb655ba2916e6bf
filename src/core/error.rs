//! Error types for the WiFi association service

use thiserror::Error;

use super::types::{FailureReason, RejectCode};

/// Result type for platform backend operations
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Result type for association manager operations
pub type AssociationResult<T> = Result<T, AssociationError>;

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors reported by the platform network layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Request rejected: {0}")]
    Rejected(RejectCode),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Profile for {0} is owned by someone else")]
    ProfileDenied(String),

    #[error("No stored profile for {0}")]
    ProfileNotFound(String),

    #[error("Network interface error: {0}")]
    InterfaceError(String),

    #[error("wpa_supplicant error: {0}")]
    WpaSupplicantError(String),
}

/// Errors delivered to callers of the connection manager
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssociationError {
    #[error("Invalid network descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Association attempt already started")]
    AlreadyRunning,

    #[error("Another association attempt is in progress")]
    InProgress,

    #[error("Association rejected: {0}")]
    Rejected(RejectCode),

    #[error("Link lost during association")]
    LinkLost,

    #[error("Association timed out")]
    TimedOut,

    #[error("Superseded by a newer association request")]
    Superseded,

    #[error("Association cancelled")]
    Cancelled,

    #[error("Not connected to {0}")]
    NotConnected(String),

    #[error("Disconnect was not confirmed in time")]
    DisconnectTimeout,

    #[error("Removing {0} was denied")]
    RemoveDenied(String),

    #[error("Platform network layer unavailable")]
    PlatformUnavailable,

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}

impl From<FailureReason> for AssociationError {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::Rejected(code) => AssociationError::Rejected(code),
            FailureReason::LinkLost => AssociationError::LinkLost,
            FailureReason::Superseded => AssociationError::Superseded,
            FailureReason::Cancelled => AssociationError::Cancelled,
            FailureReason::PlatformUnavailable => AssociationError::PlatformUnavailable,
        }
    }
}

/// Errors related to transport layer
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_maps_to_error() {
        assert_eq!(
            AssociationError::from(FailureReason::Rejected(RejectCode::NetworkNotFound)),
            AssociationError::Rejected(RejectCode::NetworkNotFound)
        );
        assert_eq!(
            AssociationError::from(FailureReason::Superseded),
            AssociationError::Superseded
        );
        assert_eq!(
            AssociationError::from(FailureReason::LinkLost),
            AssociationError::LinkLost
        );
    }

    #[test]
    fn test_error_messages() {
        let err = AssociationError::NotConnected("Home".to_string());
        assert_eq!(err.to_string(), "Not connected to Home");

        let err: AssociationError = PlatformError::ProfileDenied("Office".to_string()).into();
        assert!(err.to_string().contains("Office"));
    }
}
