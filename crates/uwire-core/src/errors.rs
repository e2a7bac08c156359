//! Error kind constants for metrics and logging.
//!
//! These constants provide consistent error classification across all crates.

/// Wire framing/parsing error.
pub const ERROR_PROTOCOL: &str = "protocol";
/// Admission control rejection (rate limit, overload, full queue).
pub const ERROR_ADMISSION: &str = "admission";
/// Request payload failed validation.
pub const ERROR_VALIDATION: &str = "validation";
/// Authentication failure.
pub const ERROR_AUTH: &str = "auth";
/// Registration state machine violation (expired/missing OTP or pending user).
pub const ERROR_STATE: &str = "state";
/// Uniqueness conflict.
pub const ERROR_CONFLICT: &str = "conflict";
/// Upstream dependency failure (database, cache, email provider).
pub const ERROR_UPSTREAM: &str = "upstream";
/// Deadline exceeded.
pub const ERROR_TIMEOUT: &str = "timeout";
/// I/O error.
pub const ERROR_IO: &str = "io";
/// Configuration error.
pub const ERROR_CONFIG: &str = "config";
/// Unclassified internal error.
pub const ERROR_INTERNAL: &str = "internal";
