//! Identity service error taxonomy.
//!
//! Handlers return a single error value; the framing boundary translates it
//! into an error frame carrying only the message. `kind()` feeds metrics.

use uwire_core::{
    ERROR_ADMISSION, ERROR_AUTH, ERROR_CONFLICT, ERROR_INTERNAL, ERROR_STATE, ERROR_UPSTREAM,
    ERROR_VALIDATION,
};
use uwire_proto::RpcError;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    /// Structurally invalid input.
    #[error("{0}")]
    Validation(String),
    /// Credential or token failure; messages are deliberately opaque.
    #[error("{0}")]
    Auth(String),
    /// Registration state machine violation (expired/missing OTP, pending user).
    #[error("{0}")]
    State(String),
    /// Uniqueness conflict on username or email.
    #[error("{0}")]
    Conflict(String),
    /// Per-key rate limit exceeded.
    #[error("{0}")]
    RateLimited(String),
    /// Dependency failure (database, cache, email provider).
    #[error("{0}")]
    Upstream(String),
    /// Unclassified internal failure.
    #[error("{0}")]
    Internal(String),
}

impl UserError {
    /// Error kind string for metrics and classification.
    pub fn kind(&self) -> &'static str {
        match self {
            UserError::Validation(_) => ERROR_VALIDATION,
            UserError::Auth(_) => ERROR_AUTH,
            UserError::State(_) => ERROR_STATE,
            UserError::Conflict(_) => ERROR_CONFLICT,
            UserError::RateLimited(_) => ERROR_ADMISSION,
            UserError::Upstream(_) => ERROR_UPSTREAM,
            UserError::Internal(_) => ERROR_INTERNAL,
        }
    }

    #[inline]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    #[inline]
    pub fn upstream(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Upstream(format!("{context}: {err}"))
    }

    #[inline]
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<UserError> for RpcError {
    fn from(err: UserError) -> Self {
        RpcError::new(err.kind(), err.to_string())
    }
}

impl From<sqlx::Error> for UserError {
    fn from(err: sqlx::Error) -> Self {
        UserError::upstream("database error", err)
    }
}
