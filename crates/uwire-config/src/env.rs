//! Environment variable overrides.
//!
//! Secrets and deployment-specific knobs are taken from the environment when
//! present, so config files never need to carry credentials.

use crate::Config;

/// Read an environment variable as a string, or fall back to the default.
pub fn env_as_string(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

/// Read an environment variable as a u64, or fall back to the default.
pub fn env_as_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read an environment variable as a usize, or fall back to the default.
pub fn env_as_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn override_string(target: &mut String, key: &str) {
    if let Ok(v) = std::env::var(key) {
        if !v.is_empty() {
            *target = v;
        }
    }
}

/// Apply environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut Config) {
    override_string(&mut config.database.url, "DATABASE_URL");
    override_string(&mut config.token.secret, "TOKEN_SECRET");
    override_string(&mut config.otp.email_api_key, "EMAIL_API_KEY");
    override_string(&mut config.otp.email_sender, "EMAIL_SENDER");

    if let Ok(v) = std::env::var("REDIS_URL") {
        if !v.is_empty() {
            config.cache.url = Some(v);
        }
    }
    override_string(&mut config.cache.host, "REDIS_HOST");
    if let Ok(v) = std::env::var("REDIS_PORT") {
        if let Ok(port) = v.parse() {
            config.cache.port = port;
        }
    }
    override_string(&mut config.cache.password, "REDIS_PASSWORD");
    config.cache.db = std::env::var("REDIS_DB")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(config.cache.db);

    config.otp.expiry_secs = env_as_u64("OTP_EXPIRY_SECS", config.otp.expiry_secs);
    config.otp.length = env_as_usize("OTP_LENGTH", config.otp.length);
    config.rate_limit.window_secs =
        env_as_u64("RATE_LIMIT_WINDOW_SECS", config.rate_limit.window_secs);
    config.rate_limit.max_attempts = std::env::var("RATE_LIMIT_MAX_REQUESTS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(config.rate_limit.max_attempts);
}
