//! Server error types.

use uwire_core::{ERROR_CONFIG, ERROR_IO, ERROR_PROTOCOL};
use uwire_proto::ParseError;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config: {0}")]
    Config(String),
    #[error("proto: {0}")]
    Proto(#[from] ParseError),
}

impl ServerError {
    /// Get the error kind string for metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            ServerError::Io(_) => ERROR_IO,
            ServerError::Config(_) => ERROR_CONFIG,
            ServerError::Proto(_) => ERROR_PROTOCOL,
        }
    }
}
