//! Configuration validation logic.

use crate::loader::ConfigError;
use crate::Config;

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.listen.trim().is_empty() {
        return Err(ConfigError::Validation("server.listen is empty".into()));
    }
    if config.server.listen.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::Validation(
            "server.listen is not a valid socket address".into(),
        ));
    }
    if config.server.message_queue_size == 0 {
        return Err(ConfigError::Validation(
            "server.message_queue_size must be > 0".into(),
        ));
    }
    if config.server.connection_pool_size == 0 {
        return Err(ConfigError::Validation(
            "server.connection_pool_size must be > 0".into(),
        ));
    }
    if config.server.handler_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "server.handler_timeout_secs must be > 0".into(),
        ));
    }
    if config.server.rate_limit_requests == 0 {
        return Err(ConfigError::Validation(
            "server.rate_limit_requests must be > 0".into(),
        ));
    }
    if let Some(n) = config.server.worker_pool_size {
        if n == 0 {
            return Err(ConfigError::Validation(
                "server.worker_pool_size must be > 0".into(),
            ));
        }
    }
    // Tokens are signed with the configured secret only; there is no
    // built-in fallback key, so an absent secret is a startup failure.
    if config.token.secret.trim().is_empty() {
        return Err(ConfigError::Validation(
            "token.secret is empty; set it in the config file or TOKEN_SECRET".into(),
        ));
    }
    if config.otp.length < 4 || config.otp.length > 10 {
        return Err(ConfigError::Validation(
            "otp.length must be 4..=10".into(),
        ));
    }
    if config.rate_limit.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "rate_limit.max_attempts must be > 0".into(),
        ));
    }
    for (name, pool) in &config.pools {
        if pool.host.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "pools.{name}.host is empty"
            )));
        }
        if pool.min_connections > pool.max_connections {
            return Err(ConfigError::Validation(format!(
                "pools.{name}: min_connections exceeds max_connections"
            )));
        }
        if pool.max_connections == 0 {
            return Err(ConfigError::Validation(format!(
                "pools.{name}.max_connections must be > 0"
            )));
        }
    }
    Ok(())
}
