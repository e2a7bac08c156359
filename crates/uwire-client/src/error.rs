//! Client error types.

use uwire_core::{ERROR_INTERNAL, ERROR_IO, ERROR_TIMEOUT, ERROR_VALIDATION};

/// Request failure as seen by the caller.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ClientError {
    /// No response arrived before the request deadline.
    #[error("timeout")]
    Timeout,
    /// The frame could not be written to the socket.
    #[error("send_failed: {0}")]
    SendFailed(String),
    /// No pool connection became available within the acquire window.
    #[error("no available connection")]
    NoConnection,
    /// The client is shutting down; all pending requests are rejected.
    #[error("shutting down")]
    ShuttingDown,
    /// The target service was never configured.
    #[error("unknown service: {0}")]
    UnknownService(String),
    /// The response payload was not valid JSON.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ClientError {
    /// Error kind string for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Timeout => ERROR_TIMEOUT,
            ClientError::SendFailed(_) | ClientError::NoConnection => ERROR_IO,
            ClientError::ShuttingDown => ERROR_INTERNAL,
            ClientError::UnknownService(_) => ERROR_VALIDATION,
            ClientError::Decode(_) => ERROR_INTERNAL,
        }
    }
}
