//! Metrics collection and Prometheus exporter for uwire.
//!
//! Counters and gauges for both transport peers and the identity service.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize Prometheus metrics exporter.
///
/// Starts an HTTP server on the given address to expose metrics.
/// Returns an error message if binding fails.
pub fn init_prometheus(listen: &str) -> Result<(), String> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| format!("invalid metrics listen address: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install prometheus exporter: {}", e))?;

    Ok(())
}

// ============================================================================
// Metric Names
// ============================================================================

/// Total number of TCP connections accepted.
pub const CONNECTIONS_TOTAL: &str = "uwire_connections_total";
/// Number of currently active connections.
pub const CONNECTIONS_ACTIVE: &str = "uwire_connections_active";
/// Total frames admitted to the worker queue.
pub const REQUESTS_TOTAL: &str = "uwire_requests_total";
/// Total requests that produced an error frame.
pub const REQUESTS_FAILED_TOTAL: &str = "uwire_requests_failed_total";
/// Total frames rejected before queueing, labeled by reason.
pub const REQUESTS_REJECTED_TOTAL: &str = "uwire_requests_rejected_total";
/// Current depth of the worker message queue.
pub const REQUEST_QUEUE_DEPTH: &str = "uwire_request_queue_depth";
/// Handler latency histogram (seconds).
pub const HANDLER_LATENCY_SECONDS: &str = "uwire_handler_latency_seconds";
/// Total errors by kind.
pub const ERRORS_TOTAL: &str = "uwire_errors_total";
/// Total resynchronizations after corrupt stream bytes.
pub const RESYNCS_TOTAL: &str = "uwire_resyncs_total";
/// Client: total requests issued, labeled by service.
pub const CLIENT_REQUESTS_TOTAL: &str = "uwire_client_requests_total";
/// Client: total failed requests, labeled by service.
pub const CLIENT_REQUESTS_FAILED_TOTAL: &str = "uwire_client_requests_failed_total";
/// Client: open pool connections, labeled by service.
pub const CLIENT_POOL_CONNECTIONS: &str = "uwire_client_pool_connections";
/// Client: total reconnect attempts, labeled by service.
pub const CLIENT_RECONNECTS_TOTAL: &str = "uwire_client_reconnects_total";
/// OTP emails dispatched.
pub const OTP_SENT_TOTAL: &str = "uwire_otp_sent_total";
/// OTP verifications, labeled by outcome.
pub const OTP_VERIFIED_TOTAL: &str = "uwire_otp_verified_total";
/// Logins, labeled by outcome.
pub const LOGINS_TOTAL: &str = "uwire_logins_total";
/// Profile cache lookups, labeled by outcome.
pub const PROFILE_CACHE_TOTAL: &str = "uwire_profile_cache_total";

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a new connection accepted.
#[inline]
pub fn record_connection_accepted() {
    counter!(CONNECTIONS_TOTAL).increment(1);
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a connection closed.
#[inline]
pub fn record_connection_closed() {
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a frame admitted to the worker queue.
#[inline]
pub fn record_request_admitted() {
    counter!(REQUESTS_TOTAL).increment(1);
}

/// Record a request that produced an error frame.
#[inline]
pub fn record_request_failed() {
    counter!(REQUESTS_FAILED_TOTAL).increment(1);
}

/// Record a frame rejected before queueing.
#[inline]
pub fn record_request_rejected(reason: &'static str) {
    counter!(REQUESTS_REJECTED_TOTAL, "reason" => reason).increment(1);
}

/// Update the worker queue depth gauge.
#[inline]
pub fn set_request_queue_depth(depth: f64) {
    gauge!(REQUEST_QUEUE_DEPTH).set(depth);
}

/// Record handler latency.
#[inline]
pub fn record_handler_latency(seconds: f64) {
    histogram!(HANDLER_LATENCY_SECONDS).record(seconds);
}

/// Record an error by kind.
#[inline]
pub fn record_error(kind: &'static str) {
    counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
}

/// Record a stream resynchronization.
#[inline]
pub fn record_resync(skipped: u64) {
    counter!(RESYNCS_TOTAL).increment(1);
    let _ = skipped;
}

/// Record a client request issued for a service.
#[inline]
pub fn record_client_request(service: &str) {
    counter!(CLIENT_REQUESTS_TOTAL, "service" => service.to_owned()).increment(1);
}

/// Record a client request failure for a service.
#[inline]
pub fn record_client_request_failed(service: &str) {
    counter!(CLIENT_REQUESTS_FAILED_TOTAL, "service" => service.to_owned()).increment(1);
}

/// Update the open-connection gauge for a service pool.
#[inline]
pub fn set_client_pool_connections(service: &str, count: f64) {
    gauge!(CLIENT_POOL_CONNECTIONS, "service" => service.to_owned()).set(count);
}

/// Record a client reconnect attempt.
#[inline]
pub fn record_client_reconnect(service: &str) {
    counter!(CLIENT_RECONNECTS_TOTAL, "service" => service.to_owned()).increment(1);
}

/// Record an OTP email dispatch.
#[inline]
pub fn record_otp_sent() {
    counter!(OTP_SENT_TOTAL).increment(1);
}

/// Record an OTP verification outcome.
#[inline]
pub fn record_otp_verified(outcome: &'static str) {
    counter!(OTP_VERIFIED_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a login outcome.
#[inline]
pub fn record_login(outcome: &'static str) {
    counter!(LOGINS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a profile cache hit or miss.
#[inline]
pub fn record_profile_cache(outcome: &'static str) {
    counter!(PROFILE_CACHE_TOTAL, "outcome" => outcome).increment(1);
}
