//! Transport-level request counters and their snapshot projection.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;
use uwire_core::LatencyEma;

/// Lock-free counters shared by the connection readers and workers.
pub struct ServerMetrics {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    active_requests: AtomicI64,
    latency: LatencyEma,
    started: Instant,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            active_requests: AtomicI64::new(0),
            latency: LatencyEma::new(),
            started: Instant::now(),
        }
    }

    pub fn request_started(&self) {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_finished(&self) {
        self.active_requests.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn request_succeeded(&self, latency: std::time::Duration) {
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
        self.latency.record(latency);
    }

    pub fn request_failed(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active_requests(&self) -> i64 {
        self.active_requests.load(Ordering::Relaxed)
    }

    /// Snapshot the counters for the metrics surface.
    pub fn snapshot(&self, queue_depth: usize) -> TransportMetrics {
        let uptime = self.started.elapsed();
        let total = self.total_requests.load(Ordering::Relaxed);
        TransportMetrics {
            total_requests: total,
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            avg_latency_ms: self.latency.get().as_secs_f64() * 1000.0,
            active_requests: self.active_requests.load(Ordering::Relaxed),
            uptime_seconds: uptime.as_secs_f64(),
            requests_per_second: if uptime.as_secs_f64() > 0.0 {
                total as f64 / uptime.as_secs_f64()
            } else {
                0.0
            },
            queue_depth,
        }
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of transport health.
#[derive(Debug, Clone, Serialize)]
pub struct TransportMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub avg_latency_ms: f64,
    pub active_requests: i64,
    pub uptime_seconds: f64,
    pub requests_per_second: f64,
    pub queue_depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn snapshot_reflects_counters() {
        let metrics = ServerMetrics::new();
        metrics.request_started();
        metrics.request_succeeded(Duration::from_millis(4));
        metrics.request_finished();
        metrics.request_started();
        metrics.request_failed();

        let snap = metrics.snapshot(3);
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.successful_requests, 1);
        assert_eq!(snap.failed_requests, 1);
        assert_eq!(snap.active_requests, 1);
        assert_eq!(snap.queue_depth, 3);
        assert!(snap.avg_latency_ms > 3.0 && snap.avg_latency_ms < 5.0);
    }
}
