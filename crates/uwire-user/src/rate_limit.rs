//! Fixed-window rate limiting keyed by caller-chosen strings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use uwire_core::RATE_LIMIT_SWEEP_SECS;

struct Entry {
    attempts: u32,
    last_try: Instant,
}

/// Fixed window per key, configured by (window, max_tries).
pub struct RateLimiter {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    window: Duration,
    max_tries: u32,
    shutdown: Arc<Notify>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_tries: u32) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            window,
            max_tries,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Decide whether a request under `key` is allowed.
    ///
    /// A fresh or expired window resets the counter to one and allows; at or
    /// past the limit the request is denied without touching the window.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut map = self.entries.lock();

        match map.get_mut(key) {
            Some(entry) if now.duration_since(entry.last_try) > self.window => {
                entry.attempts = 1;
                entry.last_try = now;
                true
            }
            Some(entry) if entry.attempts >= self.max_tries => false,
            Some(entry) => {
                entry.attempts += 1;
                entry.last_try = now;
                true
            }
            None => {
                map.insert(
                    key.to_owned(),
                    Entry {
                        attempts: 1,
                        last_try: now,
                    },
                );
                true
            }
        }
    }

    /// Remaining attempts in the current window.
    pub fn remaining_attempts(&self, key: &str) -> u32 {
        let now = Instant::now();
        let map = self.entries.lock();
        match map.get(key) {
            Some(entry) if now.duration_since(entry.last_try) <= self.window => {
                self.max_tries.saturating_sub(entry.attempts)
            }
            _ => self.max_tries,
        }
    }

    /// Time until the window for `key` resets.
    pub fn time_to_reset(&self, key: &str) -> Duration {
        let map = self.entries.lock();
        match map.get(key) {
            Some(entry) => self
                .window
                .saturating_sub(entry.last_try.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Drop keys whose window has fully elapsed.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut map = self.entries.lock();
        let before = map.len();
        map.retain(|_, entry| now.duration_since(entry.last_try) <= self.window);
        let removed = before - map.len();
        if removed > 0 {
            debug!(removed, remaining = map.len(), "rate limit entries swept");
        }
    }

    /// Start the hourly background sweeper.
    pub fn start_sweeper(self: &Arc<Self>) {
        let limiter = self.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        debug!("rate limiter sweeper shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_secs(RATE_LIMIT_SWEEP_SECS)) => {
                        limiter.sweep();
                    }
                }
            }
        });
    }

    /// Signal the sweeper to stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("window", &self.window)
            .field("max_tries", &self.max_tries)
            .field("keys", &self.entries.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_denies() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 5);
        for _ in 0..5 {
            assert!(limiter.allow("a@x"));
        }
        assert!(!limiter.allow("a@x"));
        assert!(!limiter.allow("a@x"));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 2);
        assert!(limiter.allow("a@x"));
        assert!(limiter.allow("a@x"));
        assert!(!limiter.allow("a@x"));

        assert!(limiter.allow("verify:a@x"));
        assert!(limiter.allow("verify:a@x"));
        assert!(!limiter.allow("verify:a@x"));
    }

    #[test]
    fn window_expiry_resets_counter() {
        let limiter = RateLimiter::new(Duration::ZERO, 1);
        assert!(limiter.allow("a@x"));
        std::thread::sleep(Duration::from_millis(2));
        // window elapsed, counter resets to 1
        assert!(limiter.allow("a@x"));
    }

    #[test]
    fn remaining_attempts_counts_down() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3);
        assert_eq!(limiter.remaining_attempts("a@x"), 3);
        limiter.allow("a@x");
        assert_eq!(limiter.remaining_attempts("a@x"), 2);
        limiter.allow("a@x");
        limiter.allow("a@x");
        assert_eq!(limiter.remaining_attempts("a@x"), 0);
    }

    #[test]
    fn time_to_reset_is_bounded_by_window() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        assert_eq!(limiter.time_to_reset("a@x"), Duration::ZERO);
        limiter.allow("a@x");
        let reset = limiter.time_to_reset("a@x");
        assert!(reset <= Duration::from_secs(60));
        assert!(reset > Duration::from_secs(50));
    }

    #[test]
    fn sweep_drops_expired_keys_only() {
        let limiter = RateLimiter::new(Duration::ZERO, 5);
        limiter.allow("stale");
        std::thread::sleep(Duration::from_millis(2));
        limiter.sweep();
        assert_eq!(limiter.remaining_attempts("stale"), 5);
        assert_eq!(limiter.entries.lock().len(), 0);
    }
}
