//! Lock-free exponentially-weighted latency average.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::defaults::LATENCY_EMA_ALPHA;

/// Exponential moving average of latencies, updated by compare-and-swap.
///
/// The current average is stored as `f64` nanoseconds in the bit pattern of
/// an `AtomicU64`, so concurrent recorders never take a lock.
#[derive(Debug, Default)]
pub struct LatencyEma {
    bits: AtomicU64,
}

impl LatencyEma {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observed latency into the average.
    pub fn record(&self, latency: Duration) {
        let sample = latency.as_nanos() as f64;
        loop {
            let current = self.bits.load(Ordering::Relaxed);
            let avg = f64::from_bits(current);
            let next = if current == 0 {
                // First sample seeds the average
                sample
            } else {
                sample * LATENCY_EMA_ALPHA + avg * (1.0 - LATENCY_EMA_ALPHA)
            };
            if self
                .bits
                .compare_exchange_weak(current, next.to_bits(), Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Current average latency.
    pub fn get(&self) -> Duration {
        let avg = f64::from_bits(self.bits.load(Ordering::Relaxed));
        Duration::from_nanos(avg as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn first_sample_seeds_average() {
        let ema = LatencyEma::new();
        ema.record(Duration::from_millis(10));
        assert_eq!(ema.get(), Duration::from_millis(10));
    }

    #[test]
    fn average_tracks_toward_recent_samples() {
        let ema = LatencyEma::new();
        ema.record(Duration::from_millis(100));
        for _ in 0..200 {
            ema.record(Duration::from_millis(10));
        }
        let avg = ema.get();
        assert!(avg < Duration::from_millis(12), "avg = {avg:?}");
        assert!(avg >= Duration::from_millis(10));
    }

    #[test]
    fn concurrent_recording_converges() {
        let ema = Arc::new(LatencyEma::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ema = ema.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    ema.record(Duration::from_millis(5));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ema.get().as_millis(), 5);
    }
}
