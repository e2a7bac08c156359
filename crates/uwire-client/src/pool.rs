//! Per-service connection pools and the client facade.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rand::Rng;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use uwire_config::PoolConfig;
use uwire_core::{
    ACQUIRE_WAIT_MS, DEFAULT_MAX_BUFFER_SIZE, HEALTH_CHECK_JITTER_MS, IDLE_REAP_SECS,
    PROBE_MIN_CONNECTIONS, PROBE_POOL_FRACTION, PROBE_TIMEOUT_SECS, RECONNECT_BACKOFF_FACTOR,
    RECONNECT_DELAY_CAP_SECS, WARMUP_STAGGER_MS,
};
use uwire_metrics::{
    record_client_reconnect, record_client_request, record_client_request_failed,
    set_client_pool_connections,
};
use uwire_proto::encode_request;

use crate::conn::PoolConnection;
use crate::error::ClientError;
use crate::metrics::{ServiceMetrics, ServiceMetricsSnapshot};
use crate::pending::PendingMap;

/// Interval between idle-reap cycles.
const REAP_INTERVAL: Duration = Duration::from_secs(60);

struct ServicePool {
    name: String,
    config: PoolConfig,
    addr: String,
    conns: RwLock<Vec<Arc<PoolConnection>>>,
    rr: AtomicUsize,
    next_conn_id: AtomicU64,
    connecting: AtomicUsize,
    reconnect_attempts: AtomicU32,
    pending: Arc<PendingMap>,
    metrics: Arc<ServiceMetrics>,
    available: Notify,
    shutdown: CancellationToken,
}

impl ServicePool {
    fn new(name: String, config: PoolConfig, pending: Arc<PendingMap>) -> Arc<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        Arc::new(Self {
            name,
            addr,
            config,
            conns: RwLock::new(Vec::new()),
            rr: AtomicUsize::new(0),
            next_conn_id: AtomicU64::new(0),
            connecting: AtomicUsize::new(0),
            reconnect_attempts: AtomicU32::new(0),
            pending,
            metrics: Arc::new(ServiceMetrics::new()),
            available: Notify::new(),
            shutdown: CancellationToken::new(),
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.config.health_check_interval_secs)
    }

    /// Kick off warmup, probing, reaping, and metric maintenance.
    fn start(self: &Arc<Self>) {
        self.metrics.start_tasks(self.shutdown.clone());

        // Eager warmup to min_connections, staggered to avoid stampedes.
        let pool = self.clone();
        tokio::spawn(async move {
            for _ in 0..pool.config.min_connections {
                if pool.shutdown.is_cancelled() {
                    return;
                }
                pool.clone().create_connection().await;
                tokio::time::sleep(Duration::from_millis(WARMUP_STAGGER_MS)).await;
            }
        });

        let pool = self.clone();
        tokio::spawn(async move {
            loop {
                let jitter = rand::rng().random_range(0..HEALTH_CHECK_JITTER_MS);
                let sleep = pool.probe_interval() + Duration::from_millis(jitter);
                tokio::select! {
                    _ = pool.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(sleep) => pool.probe_cycle().await,
                }
            }
        });

        let pool = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = pool.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(REAP_INTERVAL) => pool.reap_idle(),
                }
            }
        });
    }

    fn total_connections(&self) -> usize {
        self.conns.read().len()
    }

    /// Open one connection and add it to the pool.
    async fn create_connection(self: Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.connecting.fetch_add(1, Ordering::Relaxed);
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let result = PoolConnection::connect(id, &self.addr, self.timeout()).await;
        self.connecting.fetch_sub(1, Ordering::Relaxed);

        match result {
            Ok((conn, read_half)) => {
                debug!(service = %self.name, conn = id, "connection established");
                self.reconnect_attempts.store(0, Ordering::Relaxed);

                let reader_conn = conn.clone();
                let pending = self.pending.clone();
                let pool = self.clone();
                tokio::spawn(async move {
                    reader_conn
                        .clone()
                        .read_loop(read_half, pending, DEFAULT_MAX_BUFFER_SIZE)
                        .await;
                    pool.on_connection_closed(&reader_conn);
                });

                let count = {
                    let mut conns = self.conns.write();
                    conns.push(conn);
                    conns.len()
                };
                set_client_pool_connections(&self.name, count as f64);
                self.available.notify_waiters();
            }
            Err(err) => {
                warn!(service = %self.name, error = %err, "connection failed");
                self.schedule_reconnect();
            }
        }
    }

    /// Remove a dead connection; pending requests stay in the global map
    /// and time out naturally.
    fn on_connection_closed(self: &Arc<Self>, conn: &Arc<PoolConnection>) {
        let removed = {
            let mut conns = self.conns.write();
            let before = conns.len();
            conns.retain(|c| c.id != conn.id);
            before != conns.len()
        };
        if !removed {
            return;
        }
        set_client_pool_connections(&self.name, self.total_connections() as f64);
        if self.shutdown.is_cancelled() || conn.is_retired() {
            return;
        }
        debug!(service = %self.name, conn = conn.id, "connection lost");
        self.schedule_reconnect();
    }

    /// Schedule a replacement connect at `reconnectDelay * 1.5^attempt`,
    /// capped. The attempt counter resets on success.
    fn schedule_reconnect(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let attempt = self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
        let base = self.config.reconnect_delay_ms as f64;
        let delay_ms = base * RECONNECT_BACKOFF_FACTOR.powi(attempt as i32);
        let delay = Duration::from_millis(delay_ms as u64)
            .min(Duration::from_secs(RECONNECT_DELAY_CAP_SECS));
        record_client_reconnect(&self.name);
        debug!(service = %self.name, attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");

        let pool = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = pool.shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => pool.clone().create_connection().await,
            }
        });
    }

    fn pick_available(&self) -> Option<Arc<PoolConnection>> {
        let conns = self.conns.read();
        if conns.is_empty() {
            return None;
        }
        let n = conns.len();
        let start = self.rr.fetch_add(1, Ordering::Relaxed);
        (0..n)
            .map(|i| &conns[(start + i) % n])
            .find(|c| c.is_available())
            .cloned()
    }

    /// Round-robin over the available set; trigger a lazy create and wait
    /// briefly when none is free.
    async fn acquire(self: &Arc<Self>) -> Option<Arc<PoolConnection>> {
        if let Some(conn) = self.pick_available() {
            return Some(conn);
        }
        if self.total_connections() + self.connecting.load(Ordering::Relaxed)
            < self.config.max_connections
        {
            let pool = self.clone();
            tokio::spawn(async move { pool.create_connection().await });
        }
        let _ = tokio::time::timeout(
            Duration::from_millis(ACQUIRE_WAIT_MS),
            self.available.notified(),
        )
        .await;
        self.pick_available()
    }

    async fn request(
        self: &Arc<Self>,
        method: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, ClientError> {
        record_client_request(&self.name);
        self.metrics.request_started();
        let started = std::time::Instant::now();
        let result = self.do_request(method, payload).await;
        match &result {
            Ok(_) => self.metrics.request_succeeded(started.elapsed()),
            Err(_) => {
                self.metrics.request_failed();
                record_client_request_failed(&self.name);
            }
        }
        result
    }

    async fn do_request(
        self: &Arc<Self>,
        method: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, ClientError> {
        if self.shutdown.is_cancelled() {
            return Err(ClientError::ShuttingDown);
        }
        let request_id = Uuid::new_v4();
        let Some(conn) = self.acquire().await else {
            return Err(ClientError::NoConnection);
        };

        let body = serde_json::to_vec(payload).map_err(|e| ClientError::Decode(e.to_string()))?;
        let frame = encode_request(request_id, method, &body)
            .map_err(|e| ClientError::SendFailed(e.to_string()))?;

        let rx = self.pending.register(request_id);
        conn.touch();
        if let Err(err) = conn.send(&frame).await {
            self.pending.take(request_id);
            conn.mark_unavailable();
            conn.close();
            return Err(ClientError::SendFailed(err.to_string()));
        }

        match tokio::time::timeout(self.timeout(), rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::ShuttingDown),
            Err(_) => {
                // Deadline fired first: remove the entry so a late response
                // is dropped silently.
                self.pending.take(request_id);
                Err(ClientError::Timeout)
            }
        }
    }

    /// Probe a bounded subset of idle connections with short ping requests.
    async fn probe_cycle(self: &Arc<Self>) {
        let half_interval = self.probe_interval() / 2;
        let candidates: Vec<Arc<PoolConnection>> = {
            let conns = self.conns.read();
            let limit = ((conns.len() as f64 * PROBE_POOL_FRACTION).ceil() as usize)
                .max(PROBE_MIN_CONNECTIONS);
            conns
                .iter()
                // recently used connections are implicitly healthy
                .filter(|c| c.is_available() && c.idle_for() > half_interval)
                .take(limit)
                .cloned()
                .collect()
        };

        for conn in candidates {
            if self.shutdown.is_cancelled() {
                return;
            }
            if self.ping(&conn).await {
                conn.mark_probed();
            } else {
                warn!(service = %self.name, conn = conn.id, "liveness probe failed, replacing connection");
                conn.mark_unavailable();
                conn.close();
                // the reader exit schedules the replacement connect
            }
        }
    }

    async fn ping(&self, conn: &Arc<PoolConnection>) -> bool {
        let request_id = Uuid::new_v4();
        let Ok(frame) = encode_request(request_id, "ping", b"{}") else {
            return false;
        };
        let rx = self.pending.register(request_id);
        if conn.send(&frame).await.is_err() {
            self.pending.take(request_id);
            return false;
        }
        match tokio::time::timeout(Duration::from_secs(PROBE_TIMEOUT_SECS), rx).await {
            Ok(Ok(Ok(_))) => true,
            _ => {
                self.pending.take(request_id);
                false
            }
        }
    }

    /// Close connections unused for longer than the idle bound, provided
    /// the pool stays at or above min_connections.
    fn reap_idle(self: &Arc<Self>) {
        let idle_bound = Duration::from_secs(IDLE_REAP_SECS);
        let reaped: Vec<Arc<PoolConnection>> = {
            let conns = self.conns.read();
            let mut surplus = conns.len().saturating_sub(self.config.min_connections);
            let mut out = Vec::new();
            for conn in conns.iter() {
                if surplus == 0 {
                    break;
                }
                if conn.idle_for() > idle_bound {
                    out.push(conn.clone());
                    surplus -= 1;
                }
            }
            out
        };
        for conn in reaped {
            debug!(service = %self.name, conn = conn.id, "reaping idle connection");
            conn.retire();
            conn.close();
        }
    }

    fn snapshot(&self) -> ServiceMetricsSnapshot {
        self.metrics
            .snapshot(self.total_connections(), self.pending.len())
    }

    fn shutdown_pool(&self) {
        self.shutdown.cancel();
        let conns: Vec<Arc<PoolConnection>> = {
            let mut guard = self.conns.write();
            guard.drain(..).collect()
        };
        for conn in conns {
            conn.retire();
            conn.close();
        }
        set_client_pool_connections(&self.name, 0.0);
    }
}

/// Client facade: one pool per configured service, a process-wide pending
/// map, and a `request(service, method, payload)` entry point.
pub struct RpcClient {
    pools: RwLock<HashMap<String, Arc<ServicePool>>>,
    pending: Arc<PendingMap>,
}

impl RpcClient {
    pub fn new() -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            pending: Arc::new(PendingMap::new()),
        }
    }

    /// Register a target service and start warming its pool.
    pub fn configure(&self, service: &str, config: PoolConfig) {
        info!(
            service = service,
            host = %config.host,
            port = config.port,
            min = config.min_connections,
            max = config.max_connections,
            "configuring service pool"
        );
        let pool = ServicePool::new(service.to_owned(), config, self.pending.clone());
        pool.start();
        if let Some(old) = self.pools.write().insert(service.to_owned(), pool) {
            old.shutdown_pool();
        }
    }

    /// Issue one request and await its correlated response.
    pub async fn request(
        &self,
        service: &str,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, ClientError> {
        let pool = self
            .pools
            .read()
            .get(service)
            .cloned()
            .ok_or_else(|| ClientError::UnknownService(service.to_owned()))?;
        pool.request(method, &payload).await
    }

    /// Metrics snapshots, for one service or all of them.
    pub fn metrics(&self, service: Option<&str>) -> HashMap<String, ServiceMetricsSnapshot> {
        let pools = self.pools.read();
        pools
            .iter()
            .filter(|(name, _)| service.is_none_or(|s| s == name.as_str()))
            .map(|(name, pool)| (name.clone(), pool.snapshot()))
            .collect()
    }

    /// Reject all pending requests and tear down every pool.
    pub async fn shutdown(&self) {
        let pools: Vec<Arc<ServicePool>> = {
            let mut guard = self.pools.write();
            guard.drain().map(|(_, pool)| pool).collect()
        };
        for pool in &pools {
            pool.shutdown_pool();
        }
        self.pending.fail_all(ClientError::ShuttingDown);
    }
}

impl Default for RpcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("services", &self.pools.read().len())
            .field("pending", &self.pending.len())
            .finish()
    }
}
