//! Configuration type definitions for the transport peers and identity service.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::defaults::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub otp: OtpConfig,
    pub token: TokenConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Client-side pools keyed by target service name (gateway deployments).
    #[serde(default)]
    pub pools: BTreeMap<String, PoolConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address, e.g. `0.0.0.0:4100`.
    pub listen: String,
    /// Worker task count (None = max(100, 2 x logical CPUs)).
    #[serde(default)]
    pub worker_pool_size: Option<usize>,
    #[serde(default = "default_message_queue_size")]
    pub message_queue_size: usize,
    /// Concurrently accepted sockets.
    #[serde(default = "default_connection_pool_size")]
    pub connection_pool_size: usize,
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,
    /// Token bucket refill rate (requests/second).
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: u32,
    /// Token bucket burst capacity.
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,
    /// In-flight request cap before `Server overloaded`.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    /// Per-connection accumulator cap in bytes.
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres DSN. Overridable via `DATABASE_URL`.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_db_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_db_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Full connection URL; takes precedence over host/port when set.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_cache_host")]
    pub host: String,
    #[serde(default = "default_cache_port")]
    pub port: u16,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub db: i64,
}

impl CacheConfig {
    /// Effective connection URL.
    pub fn redis_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.password, self.host, self.port, self.db
            )
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_cache_host(),
            port: default_cache_port(),
            password: String::new(),
            db: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpConfig {
    #[serde(default = "default_otp_ttl_secs")]
    pub expiry_secs: u64,
    #[serde(default = "default_otp_length")]
    pub length: usize,
    #[serde(default = "default_pending_user_ttl_secs")]
    pub pending_user_ttl_secs: u64,
    /// Email provider API key. Overridable via `EMAIL_API_KEY`.
    #[serde(default)]
    pub email_api_key: String,
    /// Sender identity, e.g. `no-reply@example.com`.
    #[serde(default)]
    pub email_sender: String,
    /// Email provider API base URL.
    #[serde(default = "default_email_api_base")]
    pub email_api_base: String,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            expiry_secs: default_otp_ttl_secs(),
            length: default_otp_length(),
            pending_user_ttl_secs: default_pending_user_ttl_secs(),
            email_api_key: String::new(),
            email_sender: String::new(),
            email_api_base: default_email_api_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// HMAC signing secret. Overridable via `TOKEN_SECRET`. Startup fails
    /// when this resolves to an empty string.
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_token_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_profile_ttl_secs")]
    pub profile_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_otp_rate_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_otp_rate_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_otp_rate_window_secs(),
            max_attempts: default_otp_rate_max_attempts(),
        }
    }
}

/// Client-side connection pool settings for one target service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_pool_min_connections")]
    pub min_connections: usize,
    #[serde(default = "default_pool_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetricsConfig {
    /// Prometheus exporter listen address (None = disabled).
    #[serde(default)]
    pub listen: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level/filter (trace/debug/info/warn/error).
    #[serde(default)]
    pub level: Option<String>,
}
