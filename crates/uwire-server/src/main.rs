use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use uwire_config::{
    apply_env_overrides, apply_overrides, load_config, validate_config, CliOverrides, Config,
};
use uwire_metrics::init_prometheus;
use uwire_server::{run_with_shutdown, CancellationToken};
use uwire_user::{
    connect_pool, Cache, DisabledCache, OtpGenerator, PgIdempotencyRepository, PgUserRepository,
    RateLimiter, RedisCache, ResendMailer, TokenIssuer, UserCache, UserRpc, UserService,
};

#[derive(Parser, Debug)]
#[command(name = "uwire-server", version, about = "uwire user identity service")]
struct Args {
    /// Config file path (json/jsonc/yaml/toml)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
    #[command(flatten)]
    overrides: CliOverrides,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut config = load_config(&args.config)?;
    apply_env_overrides(&mut config);
    apply_overrides(&mut config, &args.overrides);
    validate_config(&config)?;

    let level = config.logging.level.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(listen) = &config.metrics.listen {
        match init_prometheus(listen) {
            Ok(()) => info!("prometheus metrics server listening on {}", listen),
            Err(e) => warn!("failed to start metrics server: {}", e),
        }
    }

    let handler = build_user_rpc(&config).await?;

    // Set up graceful shutdown on SIGTERM/SIGINT
    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal_handler().await;
        info!("shutdown signal received");
        shutdown_signal.cancel();
    });

    run_with_shutdown(&config.server, handler, shutdown).await?;
    Ok(())
}

/// Assemble the service graph: Postgres, cache, mailer, token issuer,
/// rate limiter, and the method router on top.
async fn build_user_rpc(config: &Config) -> Result<UserRpc, Box<dyn std::error::Error>> {
    let pool = connect_pool(&config.database).await?;
    info!(
        max_connections = config.database.max_connections,
        "connected to database"
    );

    let cache: Arc<dyn Cache> = match RedisCache::connect(&config.cache.redis_url()).await {
        Ok(cache) => {
            info!(host = %config.cache.host, "connected to cache");
            Arc::new(cache)
        }
        Err(err) => {
            // The service keeps running with cache operations degraded to
            // misses; OTP registration will be unavailable until the cache
            // returns, but login and profile reads still work.
            warn!(error = %err, "cache unavailable, running with cache disabled");
            Arc::new(DisabledCache)
        }
    };

    let user_cache = UserCache::new(
        cache,
        Duration::from_secs(config.otp.expiry_secs),
        Duration::from_secs(config.otp.pending_user_ttl_secs),
        Duration::from_secs(config.token.ttl_secs),
        Duration::from_secs(config.token.profile_ttl_secs),
    );

    let mailer = ResendMailer::new(
        config.otp.email_api_base.clone(),
        config.otp.email_api_key.clone(),
        config.otp.email_sender.clone(),
    );

    let tokens = TokenIssuer::new(
        &config.token.secret,
        Duration::from_secs(config.token.ttl_secs),
    )?;

    let limiter = Arc::new(RateLimiter::new(
        Duration::from_secs(config.rate_limit.window_secs),
        config.rate_limit.max_attempts,
    ));
    limiter.start_sweeper();

    let service = UserService::new(
        Arc::new(PgUserRepository::new(pool.clone())),
        Arc::new(PgIdempotencyRepository::new(pool)),
        user_cache,
        Arc::new(mailer),
        tokens,
        OtpGenerator::new(config.otp.length),
        limiter,
    );

    Ok(UserRpc::new(Arc::new(service)))
}

/// Wait for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", e);
            // Fall back to waiting forever
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {}", e);
                // Fall back to waiting forever
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
