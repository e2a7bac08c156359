//! Per-service client metrics: counters, rolling rate, latency EMA.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use uwire_core::{LatencyEma, METRICS_RESET_SECS};

pub(crate) struct ServiceMetrics {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    /// Requests observed since the last one-second roll.
    recent: AtomicU64,
    /// Rolled requests-per-second value.
    rate: AtomicU64,
    latency: LatencyEma,
    min_ns: AtomicU64,
    max_ns: AtomicU64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            recent: AtomicU64::new(0),
            rate: AtomicU64::new(0),
            latency: LatencyEma::new(),
            min_ns: AtomicU64::new(u64::MAX),
            max_ns: AtomicU64::new(0),
        }
    }

    pub fn request_started(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.recent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_succeeded(&self, latency: Duration) {
        self.successful.fetch_add(1, Ordering::Relaxed);
        self.latency.record(latency);
        let ns = latency.as_nanos() as u64;
        self.min_ns.fetch_min(ns, Ordering::Relaxed);
        self.max_ns.fetch_max(ns, Ordering::Relaxed);
    }

    pub fn request_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Background maintenance: a one-second rate roll and an hourly reset
    /// of the cumulative counters.
    pub fn start_tasks(self: &Arc<Self>, shutdown: CancellationToken) {
        let metrics = self.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {
                        let recent = metrics.recent.swap(0, Ordering::Relaxed);
                        metrics.rate.store(recent, Ordering::Relaxed);
                    }
                }
            }
        });

        let metrics = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(METRICS_RESET_SECS)) => {
                        metrics.reset();
                    }
                }
            }
        });
    }

    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.successful.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.min_ns.store(u64::MAX, Ordering::Relaxed);
        self.max_ns.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self, connections: usize, pending: usize) -> ServiceMetricsSnapshot {
        let min_ns = self.min_ns.load(Ordering::Relaxed);
        ServiceMetricsSnapshot {
            total_requests: self.total.load(Ordering::Relaxed),
            successful_requests: self.successful.load(Ordering::Relaxed),
            failed_requests: self.failed.load(Ordering::Relaxed),
            requests_per_second: self.rate.load(Ordering::Relaxed),
            avg_latency_ms: self.latency.get().as_secs_f64() * 1000.0,
            min_latency_ms: if min_ns == u64::MAX {
                0.0
            } else {
                min_ns as f64 / 1e6
            },
            max_latency_ms: self.max_ns.load(Ordering::Relaxed) as f64 / 1e6,
            connections,
            pending_requests: pending,
        }
    }
}

/// Point-in-time view of one service pool.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceMetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub requests_per_second: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub connections: usize,
    pub pending_requests: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_tracks_extremes() {
        let metrics = ServiceMetrics::new();
        metrics.request_started();
        metrics.request_succeeded(Duration::from_millis(2));
        metrics.request_started();
        metrics.request_succeeded(Duration::from_millis(8));
        metrics.request_started();
        metrics.request_failed();

        let snap = metrics.snapshot(3, 1);
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.successful_requests, 2);
        assert_eq!(snap.failed_requests, 1);
        assert!(snap.min_latency_ms >= 2.0 && snap.min_latency_ms < 3.0);
        assert!(snap.max_latency_ms >= 8.0 && snap.max_latency_ms < 9.0);
        assert_eq!(snap.connections, 3);
        assert_eq!(snap.pending_requests, 1);
    }

    #[test]
    fn reset_clears_cumulative_counters() {
        let metrics = ServiceMetrics::new();
        metrics.request_started();
        metrics.request_succeeded(Duration::from_millis(5));
        metrics.reset();
        let snap = metrics.snapshot(0, 0);
        assert_eq!(snap.total_requests, 0);
        assert_eq!(snap.min_latency_ms, 0.0);
        assert_eq!(snap.max_latency_ms, 0.0);
    }
}
