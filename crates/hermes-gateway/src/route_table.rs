//! The route cache: holds the merged, priority-sorted route table and
//! exposes a lock-free read path via `ArcSwap`.
//!
//! Grounded on `kairos-rs::models::router::Router`'s ownership of the
//! routing table, generalized to the remote/local merge and atomic
//! pointer-swap refresh `spec.md` §4.2 and §5 require.

use crate::matcher::RouteMatcher;
use crate::model::route::{route_order, Route, Source};
use arc_swap::ArcSwap;
use std::sync::Arc;

/// The merged, sorted route table installed atomically on each refresh.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    pub matcher: RouteMatcher,
    pub route_count: usize,
}

impl RouteTable {
    fn build(mut routes: Vec<Arc<Route>>) -> Self {
        routes.sort_by(|a, b| route_order(a, b));
        let route_count = routes.len();
        Self {
            matcher: RouteMatcher::new(routes),
            route_count,
        }
    }
}

/// Holds the currently-installed `RouteTable` behind an atomic pointer so
/// readers never block on a concurrent refresh and never observe a
/// partially-built table.
pub struct RouteCache {
    current: ArcSwap<RouteTable>,
    priority_boost: i32,
    fallback_to_local: bool,
}

impl RouteCache {
    pub fn new(priority_boost: i32, fallback_to_local: bool) -> Self {
        Self {
            current: ArcSwap::from_pointee(RouteTable::default()),
            priority_boost,
            fallback_to_local,
        }
    }

    /// Non-blocking read of the currently installed table.
    pub fn current(&self) -> Arc<RouteTable> {
        self.current.load_full()
    }

    /// Rebuilds the table from `local` routes (boosted by `priority_boost`
    /// here, against fresh clones on every call — callers pass the
    /// unboosted routes on each poll) and the registry's last known-good
    /// `remote` snapshot, then swaps it in. `remote = None` means the
    /// registry poll failed; `fallback_to_local` then decides whether to
    /// retain the previous table or install local-only.
    pub fn refresh(&self, local: Vec<Route>, remote: Option<Vec<Route>>) {
        let boosted_local: Vec<Arc<Route>> = local
            .into_iter()
            .map(|mut route| {
                if route.source == Source::Local {
                    route.priority += self.priority_boost;
                }
                Arc::new(route)
            })
            .collect();

        match remote {
            Some(remote_routes) => {
                let mut merged = boosted_local;
                merged.extend(remote_routes.into_iter().map(Arc::new));
                self.current.store(Arc::new(RouteTable::build(merged)));
            }
            None if self.fallback_to_local => {
                self.current
                    .store(Arc::new(RouteTable::build(boosted_local)));
            }
            None => {
                log::warn!("registry refresh failed and fallback_to_local is disabled; retaining previous route table");
            }
        }
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.current.load().route_count > 0
    }
}
