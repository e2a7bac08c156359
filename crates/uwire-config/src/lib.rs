//! Configuration loading, validation, and override layers for uwire.
//!
//! Precedence: config file < environment variables < CLI flags.

mod cli;
mod defaults;
mod env;
mod loader;
mod types;
mod validate;

pub use cli::{apply_overrides, CliOverrides};
pub use env::{apply_env_overrides, env_as_string, env_as_u64, env_as_usize};
pub use loader::{load_config, ConfigError};
pub use types::{
    CacheConfig, Config, DatabaseConfig, LoggingConfig, MetricsConfig, OtpConfig, PoolConfig,
    RateLimitConfig, ServerConfig, TokenConfig,
};
pub use validate::validate_config;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_json() -> &'static str {
        r#"{
            // gateway-facing listener
            "server": { "listen": "127.0.0.1:4100" },
            "database": { "url": "postgres://localhost/uwire" },
            "token": { "secret": "test-secret" }
        }"#
    }

    fn write_config(ext: &str, contents: &str) -> tempfile::TempPath {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{ext}"))
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.into_temp_path()
    }

    #[test]
    fn loads_jsonc_with_comments() {
        let path = write_config("jsonc", minimal_json());
        let config = load_config(&path).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:4100");
        assert_eq!(config.server.message_queue_size, 1000);
        assert_eq!(config.server.rate_limit_requests, 5000);
        assert_eq!(config.otp.length, 6);
        validate_config(&config).unwrap();
    }

    #[test]
    fn loads_toml() {
        let toml = r#"
[server]
listen = "0.0.0.0:4100"

[database]
url = "postgres://localhost/uwire"

[token]
secret = "s3cret"

[pools.user-service]
host = "127.0.0.1"
port = 4100
min_connections = 3
"#;
        let path = write_config("toml", toml);
        let config = load_config(&path).unwrap();
        let pool = config.pools.get("user-service").unwrap();
        assert_eq!(pool.min_connections, 3);
        assert_eq!(pool.max_connections, 10);
        assert_eq!(pool.timeout_secs, 30);
        validate_config(&config).unwrap();
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let path = write_config("ini", "listen=1");
        assert!(matches!(
            load_config(&path),
            Err(ConfigError::UnsupportedFormat(ref ext)) if ext == "ini"
        ));
    }

    #[test]
    fn missing_token_secret_fails_closed() {
        let path = write_config(
            "json",
            r#"{
                "server": { "listen": "127.0.0.1:4100" },
                "database": { "url": "postgres://localhost/uwire" },
                "token": { "secret": "" }
            }"#,
        );
        let config = load_config(&path).unwrap();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("token.secret"));
    }

    #[test]
    fn invalid_listen_address_rejected() {
        let path = write_config(
            "json",
            r#"{
                "server": { "listen": "not-an-addr" },
                "database": { "url": "postgres://localhost/uwire" },
                "token": { "secret": "s" }
            }"#,
        );
        let config = load_config(&path).unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn cli_overrides_win() {
        let path = write_config("json", minimal_json());
        let mut config = load_config(&path).unwrap();
        let overrides = CliOverrides {
            listen: Some("0.0.0.0:9999".into()),
            rate_limit_burst: Some(50),
            log_level: Some("debug".into()),
            ..Default::default()
        };
        apply_overrides(&mut config, &overrides);
        assert_eq!(config.server.listen, "0.0.0.0:9999");
        assert_eq!(config.server.rate_limit_burst, 50);
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn cache_url_assembly() {
        let mut cache = CacheConfig::default();
        assert_eq!(cache.redis_url(), "redis://localhost:6379/0");
        cache.password = "pw".into();
        assert_eq!(cache.redis_url(), "redis://:pw@localhost:6379/0");
        cache.url = Some("redis://explicit:6380/1".into());
        assert_eq!(cache.redis_url(), "redis://explicit:6380/1");
    }
}
