//! A single token bucket: continuous refill, one token per request.
//!
//! Grounded on `kairos-rs::middleware::rate_limit::RateLimitEntry`'s
//! `available_tokens`/`last_refill` fields, narrowed to the pure token-
//! bucket algorithm `spec.md` §3 and §4.5 specify.

use std::sync::Mutex;
use std::time::Instant;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// `capacity` and `refill_rate_per_sec` are fixed at construction; `tokens`
/// and `last_refill` are the only mutable state, guarded by one lock so a
/// refill-then-consume is atomic.
pub struct TokenBucket {
    capacity: f64,
    refill_rate_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_rate_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_rate_per_sec,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Refills based on elapsed time, then attempts to consume one token.
    /// On denial, returns the number of whole seconds until a token would
    /// be available, per `spec.md` §4.5's `ceil((1 - tokens) / refill_rate)`.
    pub fn try_consume(&self) -> Result<(), u64> {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - state.tokens;
            let wait_secs = (deficit / self.refill_rate_per_sec).ceil() as u64;
            Err(wait_secs.max(1))
        }
    }

    #[cfg(test)]
    pub fn tokens(&self) -> f64 {
        self.state.lock().unwrap().tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn admits_up_to_capacity_then_denies() {
        let bucket = TokenBucket::new(3.0, 1.0);
        assert!(bucket.try_consume().is_ok());
        assert!(bucket.try_consume().is_ok());
        assert!(bucket.try_consume().is_ok());
        assert!(bucket.try_consume().is_err());
    }

    #[test]
    fn tokens_never_go_negative_or_over_capacity() {
        let bucket = TokenBucket::new(2.0, 1000.0);
        for _ in 0..2 {
            bucket.try_consume().unwrap();
        }
        assert!(bucket.tokens() >= 0.0);
        sleep(Duration::from_millis(50));
        let _ = bucket.try_consume();
        assert!(bucket.tokens() <= 2.0);
    }

    #[test]
    fn refills_over_time_and_readmits() {
        let bucket = TokenBucket::new(1.0, 20.0);
        bucket.try_consume().unwrap();
        assert!(bucket.try_consume().is_err());
        sleep(Duration::from_millis(100));
        assert!(bucket.try_consume().is_ok());
    }
}
