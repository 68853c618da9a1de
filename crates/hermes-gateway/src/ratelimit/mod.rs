//! Three-scope token-bucket rate limiting: global, per-route, per-IP.
//!
//! Grounded on `kairos-rs::middleware::rate_limit::RateLimitStore`'s
//! lazily-created, key-addressed bucket map, swapping its `HashMap` +
//! periodic-cleanup discipline for an `lru::LruCache` on the per-IP scope
//! specifically, per `spec.md` §4.5's bounded-memory requirement.

pub mod token_bucket;

use ahash::RandomState;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};
use token_bucket::TokenBucket;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub global_qps: f64,
    pub per_route_qps: f64,
    pub per_ip_qps: f64,
    pub ip_map_capacity: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_qps: 1000.0,
            per_route_qps: 100.0,
            per_ip_qps: 20.0,
            ip_map_capacity: 10_000,
        }
    }
}

/// Denied request's wait hint, carried up to the `RateLimited` gateway error.
#[derive(Debug, PartialEq, Eq)]
pub struct Denied {
    pub retry_after_secs: u64,
}

/// Evaluates global, per-route, then per-IP buckets in order; all three
/// must admit. A rejection at an earlier scope means later scopes are
/// never consulted or charged (`spec.md` §4.5).
pub struct RateLimiter {
    config: RateLimitConfig,
    global: TokenBucket,
    per_route: RwLock<HashMap<String, Arc<TokenBucket>, RandomState>>,
    per_ip: Mutex<LruCache<String, Arc<TokenBucket>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = NonZeroUsize::new(config.ip_map_capacity.max(1)).unwrap();
        Self {
            config,
            global: TokenBucket::new(config.global_qps, config.global_qps),
            per_route: RwLock::new(HashMap::default()),
            per_ip: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn allow(&self, route_id: &str, client_ip: &str) -> Result<(), Denied> {
        self.global
            .try_consume()
            .map_err(|retry_after_secs| Denied { retry_after_secs })?;

        self.route_bucket(route_id)
            .try_consume()
            .map_err(|retry_after_secs| Denied { retry_after_secs })?;

        self.ip_bucket(client_ip)
            .try_consume()
            .map_err(|retry_after_secs| Denied { retry_after_secs })?;

        Ok(())
    }

    fn route_bucket(&self, route_id: &str) -> Arc<TokenBucket> {
        {
            let buckets = self.per_route.read().unwrap();
            if let Some(bucket) = buckets.get(route_id) {
                return bucket.clone();
            }
        }
        let mut buckets = self.per_route.write().unwrap();
        buckets
            .entry(route_id.to_string())
            .or_insert_with(|| Arc::new(TokenBucket::new(self.config.per_route_qps, self.config.per_route_qps)))
            .clone()
    }

    /// Eviction under load is expected and acceptable: a freshly evicted IP
    /// returns to a full bucket on re-insert (`spec.md` §4.5).
    fn ip_bucket(&self, client_ip: &str) -> Arc<TokenBucket> {
        let mut cache = self.per_ip.lock().unwrap();
        if let Some(bucket) = cache.get(client_ip) {
            return bucket.clone();
        }
        let bucket = Arc::new(TokenBucket::new(self.config.per_ip_qps, self.config.per_ip_qps));
        cache.put(client_ip.to_string(), bucket.clone());
        bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_the_tightest_scope_then_denies() {
        let limiter = RateLimiter::new(RateLimitConfig {
            global_qps: 10.0,
            per_route_qps: 5.0,
            per_ip_qps: 3.0,
            ip_map_capacity: 10,
        });
        assert!(limiter.allow("route-a", "1.1.1.1").is_ok());
        assert!(limiter.allow("route-a", "1.1.1.1").is_ok());
        assert!(limiter.allow("route-a", "1.1.1.1").is_ok());
        assert!(limiter.allow("route-a", "1.1.1.1").is_err());
    }

    #[test]
    fn distinct_ips_get_independent_buckets() {
        let limiter = RateLimiter::new(RateLimitConfig {
            global_qps: 100.0,
            per_route_qps: 100.0,
            per_ip_qps: 1.0,
            ip_map_capacity: 10,
        });
        assert!(limiter.allow("route-a", "1.1.1.1").is_ok());
        assert!(limiter.allow("route-a", "1.1.1.1").is_err());
        assert!(limiter.allow("route-a", "2.2.2.2").is_ok());
    }

    #[test]
    fn global_rejection_short_circuits_before_charging_other_scopes() {
        let limiter = RateLimiter::new(RateLimitConfig {
            global_qps: 1.0,
            per_route_qps: 100.0,
            per_ip_qps: 100.0,
            ip_map_capacity: 10,
        });
        assert!(limiter.allow("route-a", "1.1.1.1").is_ok());
        assert!(limiter.allow("route-a", "1.1.1.1").is_err());
        // per-route/per-ip buckets were never touched by the rejected call.
        assert_eq!(limiter.route_bucket("route-a").tokens(), 99.0);
    }

    #[test]
    fn lru_eviction_resets_the_evicted_ip_to_full_capacity() {
        let limiter = RateLimiter::new(RateLimitConfig {
            global_qps: 1000.0,
            per_route_qps: 1000.0,
            per_ip_qps: 1.0,
            ip_map_capacity: 1,
        });
        assert!(limiter.allow("route-a", "1.1.1.1").is_ok());
        assert!(limiter.allow("route-a", "1.1.1.1").is_err());
        // Inserting a second IP evicts "1.1.1.1" from the size-1 cache.
        assert!(limiter.allow("route-a", "2.2.2.2").is_ok());
        assert!(limiter.allow("route-a", "1.1.1.1").is_ok());
    }
}
