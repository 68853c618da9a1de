//! Per-target circuit breaker state machine.
//!
//! Grounded on `kairos-rs::services::circuit_breaker::CircuitBreaker`, with
//! two deltas `spec.md` §4.6 requires: a single in-flight half-open probe
//! (an `AtomicBool` gate with an RAII permit, not the teacher's
//! `success_threshold` counter) keyed by `service_id ∪ direct_url` rather
//! than `host:port`.

use ahash::RandomState;
use log::{debug, info, warn};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u64,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BreakerError {
    #[error("circuit is open")]
    Open,
}

/// One target's breaker. `key` is the `service_id` or `direct_url` the
/// target is addressed by, never a live instance handle (`spec.md` §9).
#[derive(Debug)]
pub struct CircuitBreaker {
    key: String,
    config: CircuitBreakerConfig,
    state: AtomicU8,
    consecutive_failures: AtomicU64,
    last_transition: RwLock<Instant>,
    probe_in_flight: AtomicBool,
}

impl CircuitBreaker {
    pub fn new(key: String, config: CircuitBreakerConfig) -> Arc<Self> {
        Arc::new(Self {
            key,
            config,
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU64::new(0),
            last_transition: RwLock::new(Instant::now()),
            probe_in_flight: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Requests permission to call the target. On `Ok`, the caller must
    /// eventually call `.success()` or `.failure()` on the returned permit;
    /// if the permit is dropped without either (request cancellation), the
    /// half-open probe slot is released automatically.
    pub fn try_acquire(self: &Arc<Self>) -> Result<BreakerPermit, BreakerError> {
        match self.state() {
            CircuitState::Closed => Ok(BreakerPermit::new(self.clone(), false)),
            CircuitState::Open => {
                if self.reset_timeout_elapsed() {
                    self.transition_to_half_open();
                    self.acquire_probe()
                } else {
                    Err(BreakerError::Open)
                }
            }
            CircuitState::HalfOpen => self.acquire_probe(),
        }
    }

    fn acquire_probe(self: &Arc<Self>) -> Result<BreakerPermit, BreakerError> {
        match self
            .probe_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(BreakerPermit::new(self.clone(), true)),
            Err(_) => Err(BreakerError::Open),
        }
    }

    fn reset_timeout_elapsed(&self) -> bool {
        self.last_transition.read().unwrap().elapsed() >= self.config.reset_timeout
    }

    fn record_success(&self, was_probe: bool) {
        match self.state() {
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::Release);
            }
            CircuitState::HalfOpen => {
                if was_probe {
                    self.transition_to_closed();
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self, was_probe: bool) {
        match self.state() {
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    self.transition_to_open();
                }
            }
            CircuitState::HalfOpen => {
                if was_probe {
                    self.transition_to_open();
                }
            }
            CircuitState::Open => {}
        }
    }

    fn release_probe(&self) {
        self.probe_in_flight.store(false, Ordering::Release);
    }

    fn transition_to_open(&self) {
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        *self.last_transition.write().unwrap() = Instant::now();
        self.probe_in_flight.store(false, Ordering::Release);
        warn!("circuit breaker for {} opened after {} consecutive failures", self.key, self.config.failure_threshold);
    }

    fn transition_to_half_open(&self) {
        self.state.store(CircuitState::HalfOpen as u8, Ordering::Release);
        *self.last_transition.write().unwrap() = Instant::now();
        info!("circuit breaker for {} entering half-open", self.key);
    }

    fn transition_to_closed(&self) {
        self.state.store(CircuitState::Closed as u8, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
        self.probe_in_flight.store(false, Ordering::Release);
        info!("circuit breaker for {} closed, target recovered", self.key);
    }
}

/// RAII handle returned by `try_acquire`. Resolves the breaker's bookkeeping
/// exactly once, on success, failure, or drop.
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    is_probe: bool,
    resolved: Cell<bool>,
}

impl BreakerPermit {
    fn new(breaker: Arc<CircuitBreaker>, is_probe: bool) -> Self {
        Self {
            breaker,
            is_probe,
            resolved: Cell::new(false),
        }
    }

    pub fn success(self) {
        self.breaker.record_success(self.is_probe);
        self.resolved.set(true);
    }

    pub fn failure(self) {
        self.breaker.record_failure(self.is_probe);
        self.resolved.set(true);
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.resolved.get() && self.is_probe {
            debug!("half-open probe for {} cancelled without resolution, releasing slot", self.breaker.key);
            self.breaker.release_probe();
        }
    }
}

/// Owns one `CircuitBreaker` per target key, created lazily on first use.
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>, RandomState>>,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::default()),
        }
    }

    pub fn get_or_create(&self, key: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().unwrap().get(key) {
            return existing.clone();
        }
        let mut breakers = self.breakers.write().unwrap();
        breakers
            .entry(key.to_string())
            .or_insert_with(|| CircuitBreaker::new(key.to_string(), self.config))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            reset_timeout: Duration::from_millis(10),
        }
    }

    #[test]
    fn n_consecutive_failures_opens_circuit() {
        let breaker = CircuitBreaker::new("svc".to_string(), fast_config());
        for _ in 0..2 {
            breaker.try_acquire().unwrap().failure();
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        breaker.try_acquire().unwrap().failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn open_circuit_rejects_immediately() {
        let breaker = CircuitBreaker::new("svc".to_string(), fast_config());
        for _ in 0..3 {
            breaker.try_acquire().unwrap().failure();
        }
        assert_eq!(breaker.try_acquire(), Err(BreakerError::Open));
    }

    #[test]
    fn half_open_admits_exactly_one_probe() {
        let breaker = CircuitBreaker::new("svc".to_string(), fast_config());
        for _ in 0..3 {
            breaker.try_acquire().unwrap().failure();
        }
        std::thread::sleep(Duration::from_millis(15));

        let probe = breaker.try_acquire().unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.try_acquire(), Err(BreakerError::Open));

        probe.success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn cancelled_probe_releases_slot_without_closing() {
        let breaker = CircuitBreaker::new("svc".to_string(), fast_config());
        for _ in 0..3 {
            breaker.try_acquire().unwrap().failure();
        }
        std::thread::sleep(Duration::from_millis(15));

        {
            let _probe = breaker.try_acquire().unwrap();
            // dropped without success()/failure(): simulates cancellation
        }
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire().is_ok());
    }

    #[test]
    fn failed_probe_reopens_circuit() {
        let breaker = CircuitBreaker::new("svc".to_string(), fast_config());
        for _ in 0..3 {
            breaker.try_acquire().unwrap().failure();
        }
        std::thread::sleep(Duration::from_millis(15));

        breaker.try_acquire().unwrap().failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn registry_reuses_breaker_per_key() {
        let registry = BreakerRegistry::new(fast_config());
        let a = registry.get_or_create("svc-a");
        let b = registry.get_or_create("svc-a");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
