//! Default configuration values.
//!
//! Centralized default constants for use across all crates.

// ============================================================================
// Server Defaults
// ============================================================================

/// Minimum number of worker tasks draining the message queue.
pub const DEFAULT_WORKER_POOL_FLOOR: usize = 100;
/// Default message queue depth between connection readers and workers.
pub const DEFAULT_MESSAGE_QUEUE_SIZE: usize = 1000;
/// Default number of concurrently accepted sockets.
pub const DEFAULT_CONNECTION_POOL_SIZE: usize = 1000;
/// Default per-request handler deadline in seconds.
pub const DEFAULT_HANDLER_TIMEOUT_SECS: u64 = 5;
/// Default admitted requests per second (token bucket refill rate).
pub const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 5000;
/// Default token bucket burst capacity.
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 1000;
/// Default maximum in-flight requests before `Server overloaded`.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10_000;
/// Default per-connection accumulator cap (10 MiB).
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 10 * 1024 * 1024;
/// Default read deadline per read attempt in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;
/// Default write deadline per response in seconds.
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;
/// Scratch buffer size for socket reads (16 KiB for fewer syscalls).
pub const READ_SCRATCH_SIZE: usize = 16 * 1024;
/// Default graceful shutdown drain period in seconds.
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

// ============================================================================
// Client Pool Defaults
// ============================================================================

/// Default minimum connections kept per service pool.
pub const DEFAULT_POOL_MIN_CONNECTIONS: usize = 2;
/// Default maximum connections per service pool.
pub const DEFAULT_POOL_MAX_CONNECTIONS: usize = 10;
/// Default request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Default liveness probe interval in seconds.
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 30;
/// Maximum jitter added to the probe interval in milliseconds.
pub const HEALTH_CHECK_JITTER_MS: u64 = 5000;
/// Probe request timeout in seconds.
pub const PROBE_TIMEOUT_SECS: u64 = 2;
/// Minimum number of connections probed per cycle.
pub const PROBE_MIN_CONNECTIONS: usize = 5;
/// Fraction of the pool probed per cycle.
pub const PROBE_POOL_FRACTION: f64 = 0.2;
/// Default base reconnect delay in milliseconds.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;
/// Reconnect backoff multiplier per failed attempt.
pub const RECONNECT_BACKOFF_FACTOR: f64 = 1.5;
/// Reconnect delay cap in seconds.
pub const RECONNECT_DELAY_CAP_SECS: u64 = 30;
/// Idle period after which a surplus connection is reaped, in seconds.
pub const IDLE_REAP_SECS: u64 = 300;
/// How long an acquire waits for a connection slot, in milliseconds.
pub const ACQUIRE_WAIT_MS: u64 = 50;
/// Stagger between warmup connection attempts, in milliseconds.
pub const WARMUP_STAGGER_MS: u64 = 50;
/// Interval for cumulative client metric resets, in seconds.
pub const METRICS_RESET_SECS: u64 = 3600;

// ============================================================================
// Identity Service Defaults
// ============================================================================

/// Default OTP time-to-live in seconds.
pub const DEFAULT_OTP_TTL_SECS: u64 = 300;
/// Default OTP digit count.
pub const DEFAULT_OTP_LENGTH: usize = 6;
/// Default pending-user snapshot time-to-live in seconds.
pub const DEFAULT_PENDING_USER_TTL_SECS: u64 = 900;
/// Default bearer token time-to-live in seconds.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 86_400;
/// Default profile snapshot time-to-live in seconds.
pub const DEFAULT_PROFILE_TTL_SECS: u64 = 86_400;
/// Default OTP rate-limit window in seconds.
pub const DEFAULT_OTP_RATE_WINDOW_SECS: u64 = 900;
/// Default OTP attempts allowed per window.
pub const DEFAULT_OTP_RATE_MAX_ATTEMPTS: u32 = 5;
/// Interval between rate limiter sweeps, in seconds.
pub const RATE_LIMIT_SWEEP_SECS: u64 = 3600;

// ============================================================================
// Database Defaults
// ============================================================================

/// Default maximum Postgres pool connections.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 20;
/// Default minimum Postgres pool connections.
pub const DEFAULT_DB_MIN_CONNECTIONS: u32 = 5;
/// Default connection acquire timeout in seconds.
pub const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;
/// Default maximum connection lifetime in seconds.
pub const DEFAULT_DB_MAX_LIFETIME_SECS: u64 = 3600;
/// Default connection idle timeout in seconds.
pub const DEFAULT_DB_IDLE_TIMEOUT_SECS: u64 = 1800;

// ============================================================================
// EMA
// ============================================================================

/// Smoothing factor for latency moving averages.
pub const LATENCY_EMA_ALPHA: f64 = 0.05;
