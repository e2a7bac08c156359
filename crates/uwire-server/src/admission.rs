//! Request admission control.
//!
//! A token bucket bounds the accepted request rate before anything is
//! queued; denied frames get a synchronous `Rate limit exceeded` response.

use std::time::Instant;

use parking_lot::Mutex;

/// Token bucket refilled continuously at `rate` tokens per second.
pub struct TokenBucket {
    state: Mutex<BucketState>,
    rate: f64,
    burst: f64,
}

struct BucketState {
    tokens: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    /// Create a bucket admitting `rate` requests per second with the given
    /// burst capacity. The bucket starts full.
    pub fn new(rate: u32, burst: u32) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: burst as f64,
                refilled_at: Instant::now(),
            }),
            rate: rate as f64,
            burst: burst as f64,
        }
    }

    /// Take one token if available.
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.refilled_at).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.refilled_at = now;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("rate", &self.rate)
            .field("burst", &self.burst)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn burst_is_admitted_then_denied() {
        let bucket = TokenBucket::new(1, 5);
        for _ in 0..5 {
            assert!(bucket.allow());
        }
        assert!(!bucket.allow());
    }

    #[test]
    fn tokens_refill_over_time() {
        let bucket = TokenBucket::new(1000, 1);
        assert!(bucket.allow());
        assert!(!bucket.allow());
        std::thread::sleep(Duration::from_millis(5));
        assert!(bucket.allow());
    }

    #[test]
    fn refill_never_exceeds_burst() {
        let bucket = TokenBucket::new(1_000_000, 3);
        std::thread::sleep(Duration::from_millis(10));
        for _ in 0..3 {
            assert!(bucket.allow());
        }
        assert!(!bucket.allow());
    }
}
