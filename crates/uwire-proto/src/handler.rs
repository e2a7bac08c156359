//! Dispatch contract between the transport and the business methods.

use std::sync::Arc;

use async_trait::async_trait;

/// An error produced by a method handler, carried back as an error frame.
///
/// `kind` is one of the `uwire_core::errors` constants and feeds metrics;
/// only `message` crosses the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub kind: &'static str,
    pub message: String,
}

impl RpcError {
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_method(method: &str) -> Self {
        Self::new(uwire_core::ERROR_VALIDATION, format!("unknown method: {method}"))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(uwire_core::ERROR_INTERNAL, message)
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RpcError {}

/// Trait for business method dispatch.
///
/// Implementations must be thread-safe (`Send + Sync`); the server worker
/// pool invokes them concurrently and applies the per-request deadline
/// around each call.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    /// Execute `method` with the given JSON payload.
    ///
    /// Returns the response body to serialize into the response frame, or an
    /// [`RpcError`] translated into an error frame by the transport.
    async fn dispatch(&self, method: &str, payload: &[u8])
        -> Result<serde_json::Value, RpcError>;
}

/// Blanket implementation for `Arc<H>` where `H: RpcHandler`.
#[async_trait]
impl<H: RpcHandler + ?Sized> RpcHandler for Arc<H> {
    #[inline]
    async fn dispatch(
        &self,
        method: &str,
        payload: &[u8],
    ) -> Result<serde_json::Value, RpcError> {
        (**self).dispatch(method, payload).await
    }
}
