//! Core building blocks shared across uwire crates.
//!
//! This crate provides:
//! - Default configuration values
//! - Error kind constants for metrics/logging
//! - The ring buffer used by both peers to accumulate wire bytes
//! - A bounded, non-blocking object pool
//! - A lock-free latency moving average

pub mod buffer;
pub mod defaults;
pub mod ema;
pub mod errors;
pub mod pool;

pub use buffer::CircularBuffer;
pub use defaults::*;
pub use ema::LatencyEma;
pub use errors::*;
pub use pool::ObjectPool;

/// Project name.
pub const PROJECT_NAME: &str = "uwire";
/// Project version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
