//! Per-service instance selection.
//!
//! Grounded on `kairos-rs::services::load_balancer`'s strategy trait and
//! per-backend connection tracking, narrowed to the three strategies
//! `spec.md` §4.3 keeps (`round_robin`, `random`, `least_conn` — the
//! teacher's `Weighted` and `IpHash` have no spec counterpart and are
//! dropped in the trimming pass).

use crate::model::service::Instance;
use ahash::RandomState;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    RoundRobin,
    Random,
    LeastConn,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("no healthy instance for service: {0}")]
pub struct NoHealthyInstance(pub String);

/// Picks one healthy instance per request and tracks `active_conn_count`
/// per instance key across picks. One `LoadBalancer` serves all services;
/// round-robin counters and connection counts are keyed independently so
/// services never interfere with each other.
pub struct LoadBalancer {
    strategy: Strategy,
    round_robin_counters: RwLock<HashMap<String, AtomicUsize, RandomState>>,
    active_conns: RwLock<HashMap<String, AtomicU64, RandomState>>,
}

impl LoadBalancer {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            round_robin_counters: RwLock::new(HashMap::default()),
            active_conns: RwLock::new(HashMap::default()),
        }
    }

    /// Selects an instance from `instances`'s healthy subset for
    /// `service_id`, incrementing that instance's `active_conn_count`.
    /// The caller must call `release` with the same key once the request
    /// completes, on every exit path (success, failure, cancellation).
    pub fn pick(&self, service_id: &str, instances: &[Instance]) -> Result<Instance, NoHealthyInstance> {
        let healthy: Vec<&Instance> = instances.iter().filter(|i| i.healthy).collect();
        if healthy.is_empty() {
            return Err(NoHealthyInstance(service_id.to_string()));
        }

        let chosen = match self.strategy {
            Strategy::RoundRobin => {
                let index = self.next_round_robin_index(service_id, healthy.len());
                healthy[index]
            }
            Strategy::Random => {
                let index = rand::thread_rng().gen_range(0..healthy.len());
                healthy[index]
            }
            Strategy::LeastConn => self.pick_least_conn(&healthy),
        };

        self.increment(&chosen.key());
        Ok(chosen.clone())
    }

    /// Decrements `active_conn_count` for the instance addressed by `key`
    /// (`Instance::key`). Safe to call even if the key was never picked.
    pub fn release(&self, key: &str) {
        let conns = self.active_conns.read().unwrap();
        if let Some(counter) = conns.get(key) {
            let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                Some(c.saturating_sub(1))
            });
        }
    }

    pub fn active_conn_count(&self, key: &str) -> u64 {
        self.active_conns
            .read()
            .unwrap()
            .get(key)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    fn next_round_robin_index(&self, service_id: &str, len: usize) -> usize {
        {
            let counters = self.round_robin_counters.read().unwrap();
            if let Some(counter) = counters.get(service_id) {
                return counter.fetch_add(1, Ordering::Relaxed) % len;
            }
        }
        let mut counters = self.round_robin_counters.write().unwrap();
        let counter = counters
            .entry(service_id.to_string())
            .or_insert_with(|| AtomicUsize::new(0));
        counter.fetch_add(1, Ordering::Relaxed) % len
    }

    fn pick_least_conn<'a>(&self, healthy: &[&'a Instance]) -> &'a Instance {
        let counts: Vec<u64> = healthy.iter().map(|i| self.active_conn_count(&i.key())).collect();
        let min = *counts.iter().min().unwrap();
        let candidates: Vec<usize> = counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == min)
            .map(|(i, _)| i)
            .collect();
        let chosen = if candidates.len() == 1 {
            candidates[0]
        } else {
            candidates[rand::thread_rng().gen_range(0..candidates.len())]
        };
        healthy[chosen]
    }

    fn increment(&self, key: &str) {
        {
            let conns = self.active_conns.read().unwrap();
            if let Some(counter) = conns.get(key) {
                counter.fetch_add(1, Ordering::AcqRel);
                return;
            }
        }
        let mut conns = self.active_conns.write().unwrap();
        conns
            .entry(key.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: &str, healthy: bool) -> Instance {
        Instance {
            instance_id: id.to_string(),
            base_url: format!("http://{id}"),
            healthy,
        }
    }

    #[test]
    fn round_robin_cycles_through_healthy_instances() {
        let balancer = LoadBalancer::new(Strategy::RoundRobin);
        let instances = vec![instance("a", true), instance("b", true), instance("c", true)];
        let picks: Vec<String> = (0..3)
            .map(|_| balancer.pick("svc", &instances).unwrap().instance_id)
            .collect();
        assert_eq!(picks, vec!["a", "b", "c"]);
    }

    #[test]
    fn unhealthy_instances_are_skipped() {
        let balancer = LoadBalancer::new(Strategy::RoundRobin);
        let instances = vec![instance("a", false), instance("b", true)];
        for _ in 0..4 {
            assert_eq!(balancer.pick("svc", &instances).unwrap().instance_id, "b");
        }
    }

    #[test]
    fn all_unhealthy_fails_fast() {
        let balancer = LoadBalancer::new(Strategy::RoundRobin);
        let instances = vec![instance("a", false)];
        assert_eq!(balancer.pick("svc", &instances), Err(NoHealthyInstance("svc".to_string())));
    }

    #[test]
    fn least_conn_picks_minimum_and_release_restores_count() {
        let balancer = LoadBalancer::new(Strategy::LeastConn);
        let instances = vec![instance("i1", true), instance("i2", true), instance("i3", true)];

        // Load i1 to 2 and i3 to 1, leaving i2 at 0.
        let i1 = balancer.pick("svc", &instances).unwrap();
        let _ = balancer.pick("svc", &[instance("i1", true)]).unwrap();
        let i3 = balancer.pick("svc", &[instance("i3", true)]).unwrap();
        assert_eq!(i1.instance_id, "i1");
        assert_eq!(i3.instance_id, "i3");

        let picked = balancer.pick("svc", &instances).unwrap();
        assert_eq!(picked.instance_id, "i2");

        let prior = balancer.active_conn_count(&picked.key());
        balancer.release(&picked.key());
        assert_eq!(balancer.active_conn_count(&picked.key()), prior - 1);
    }
}
