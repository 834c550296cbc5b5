use std::time::Duration;
use thiserror::Error;

/// Failures reported by a [`TransportClient`](crate::domain::ports::TransportClient).
///
/// The distinction that matters to callers is [`TransportError::is_recovery_required`]:
/// once a request has left the process, a failure of that kind means the
/// terminal may still have acted on it and only a status query can tell.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Connection to the terminal was lost")]
    Disconnected,
    #[error("Unable to connect: {0}")]
    ConnectFailed(String),
    #[error("Timed out after {0:?} waiting for a response")]
    Timeout(Duration),
    #[error("Error recovery required: {0}")]
    RecoveryRequired(String),
    #[error("Request rejected before transmission: {0}")]
    SendRejected(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// The transport shut down for good; nothing more will be received.
    #[error("Transport closed")]
    Closed,
}

impl TransportError {
    /// Returns true when the failure leaves the outcome of an already
    /// transmitted request unknown.
    pub fn is_recovery_required(&self) -> bool {
        matches!(
            self,
            TransportError::Network(_)
                | TransportError::Disconnected
                | TransportError::ConnectFailed(_)
                | TransportError::Timeout(_)
                | TransportError::RecoveryRequired(_)
                | TransportError::Closed
        )
    }

    /// Whether the connection itself went away, as opposed to a slow peer.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            TransportError::Disconnected | TransportError::ConnectFailed(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Transport error: {0}")]
    TransportError(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, PaymentError>;

/// Result alias for transport-level operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;
