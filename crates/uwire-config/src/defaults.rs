//! Default value functions for serde deserialization.
//!
//! These functions forward to constants defined in `uwire_core::defaults`.

use uwire_core::defaults;

/// Generate default value functions that forward to uwire_core::defaults constants.
macro_rules! default_fns {
    ($($fn_name:ident => $const_name:ident : $ty:ty),* $(,)?) => {
        $(
            pub(crate) fn $fn_name() -> $ty {
                defaults::$const_name
            }
        )*
    };
}

default_fns! {
    default_message_queue_size      => DEFAULT_MESSAGE_QUEUE_SIZE: usize,
    default_connection_pool_size    => DEFAULT_CONNECTION_POOL_SIZE: usize,
    default_handler_timeout_secs    => DEFAULT_HANDLER_TIMEOUT_SECS: u64,
    default_rate_limit_requests     => DEFAULT_RATE_LIMIT_REQUESTS: u32,
    default_rate_limit_burst        => DEFAULT_RATE_LIMIT_BURST: u32,
    default_max_concurrent_requests => DEFAULT_MAX_CONCURRENT_REQUESTS: usize,
    default_max_buffer_size         => DEFAULT_MAX_BUFFER_SIZE: usize,
    default_read_timeout_secs       => DEFAULT_READ_TIMEOUT_SECS: u64,
    default_write_timeout_secs      => DEFAULT_WRITE_TIMEOUT_SECS: u64,
    default_shutdown_grace_secs     => DEFAULT_SHUTDOWN_GRACE_SECS: u64,
    default_pool_min_connections    => DEFAULT_POOL_MIN_CONNECTIONS: usize,
    default_pool_max_connections    => DEFAULT_POOL_MAX_CONNECTIONS: usize,
    default_request_timeout_secs    => DEFAULT_REQUEST_TIMEOUT_SECS: u64,
    default_health_check_interval_secs => DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64,
    default_reconnect_delay_ms      => DEFAULT_RECONNECT_DELAY_MS: u64,
    default_otp_ttl_secs            => DEFAULT_OTP_TTL_SECS: u64,
    default_otp_length              => DEFAULT_OTP_LENGTH: usize,
    default_pending_user_ttl_secs   => DEFAULT_PENDING_USER_TTL_SECS: u64,
    default_token_ttl_secs          => DEFAULT_TOKEN_TTL_SECS: u64,
    default_profile_ttl_secs        => DEFAULT_PROFILE_TTL_SECS: u64,
    default_otp_rate_window_secs    => DEFAULT_OTP_RATE_WINDOW_SECS: u64,
    default_otp_rate_max_attempts   => DEFAULT_OTP_RATE_MAX_ATTEMPTS: u32,
    default_db_max_connections      => DEFAULT_DB_MAX_CONNECTIONS: u32,
    default_db_min_connections      => DEFAULT_DB_MIN_CONNECTIONS: u32,
    default_db_acquire_timeout_secs => DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64,
    default_db_max_lifetime_secs    => DEFAULT_DB_MAX_LIFETIME_SECS: u64,
    default_db_idle_timeout_secs    => DEFAULT_DB_IDLE_TIMEOUT_SECS: u64,
}

pub(crate) fn default_cache_host() -> String {
    "localhost".to_string()
}

pub(crate) fn default_cache_port() -> u16 {
    6379
}

pub(crate) fn default_email_api_base() -> String {
    "https://api.resend.com".to_string()
}
