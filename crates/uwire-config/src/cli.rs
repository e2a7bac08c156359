//! CLI override definitions and application logic.

use clap::Parser;

use crate::Config;

#[derive(Debug, Clone, Parser, Default)]
pub struct CliOverrides {
    /// Override server listen address, e.g. 0.0.0.0:4100
    #[arg(long)]
    pub listen: Option<String>,
    /// Override worker pool size
    #[arg(long)]
    pub worker_pool_size: Option<usize>,
    /// Override message queue depth
    #[arg(long)]
    pub message_queue_size: Option<usize>,
    /// Override maximum concurrently accepted sockets
    #[arg(long)]
    pub connection_pool_size: Option<usize>,
    /// Override per-request handler deadline (seconds)
    #[arg(long)]
    pub handler_timeout_secs: Option<u64>,
    /// Override admission rate limit (requests/second)
    #[arg(long)]
    pub rate_limit_requests: Option<u32>,
    /// Override admission burst capacity
    #[arg(long)]
    pub rate_limit_burst: Option<u32>,
    /// Override metrics listen address
    #[arg(long)]
    pub metrics_listen: Option<String>,
    /// Override log level (trace/debug/info/warn/error)
    #[arg(long)]
    pub log_level: Option<String>,
}

pub fn apply_overrides(config: &mut Config, overrides: &CliOverrides) {
    if let Some(listen) = &overrides.listen {
        config.server.listen = listen.clone();
    }
    if let Some(n) = overrides.worker_pool_size {
        config.server.worker_pool_size = Some(n);
    }
    if let Some(n) = overrides.message_queue_size {
        config.server.message_queue_size = n;
    }
    if let Some(n) = overrides.connection_pool_size {
        config.server.connection_pool_size = n;
    }
    if let Some(n) = overrides.handler_timeout_secs {
        config.server.handler_timeout_secs = n;
    }
    if let Some(n) = overrides.rate_limit_requests {
        config.server.rate_limit_requests = n;
    }
    if let Some(n) = overrides.rate_limit_burst {
        config.server.rate_limit_burst = n;
    }
    if let Some(listen) = &overrides.metrics_listen {
        config.metrics.listen = Some(listen.clone());
    }
    if let Some(level) = &overrides.log_level {
        config.logging.level = Some(level.clone());
    }
}
