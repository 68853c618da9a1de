//! Route matching: a linear scan over a pre-sorted table of compiled
//! routes, grounded on `kairos-rs::utils::route_matcher::RouteMatcher` but
//! without its static/dynamic split — `spec.md` §4.1 calls for first-hit
//! wins in table order, not specificity-based reordering, so a trie or a
//! static/dynamic HashMap split would buy nothing a linear scan over a few
//! hundred routes doesn't already give cheaply.

pub mod pattern;

use crate::model::route::Route;
use pattern::Pattern;
use std::sync::Arc;

/// A route together with its pre-compiled path pattern, ready to test
/// against an incoming request in one pass.
#[derive(Debug, Clone)]
pub struct CompiledRoute {
    pub route: Arc<Route>,
    pattern: Pattern,
}

#[derive(Debug, thiserror::Error)]
pub enum RouteMatchError {
    #[error("no route matches path: {0}")]
    NoMatch(String),
}

/// An immutable, table-order list of compiled routes. Built once per
/// `RouteTable` refresh and walked top-to-bottom on every request.
#[derive(Debug, Clone, Default)]
pub struct RouteMatcher {
    routes: Vec<CompiledRoute>,
}

impl RouteMatcher {
    /// Compiles `routes`, which must already be sorted by
    /// `model::route::route_order`. Compilation failures are not expected
    /// here since `Route::new` already validated the pattern; a route that
    /// somehow fails is skipped rather than poisoning the whole table.
    pub fn new(routes: Vec<Arc<Route>>) -> Self {
        let compiled = routes
            .into_iter()
            .filter_map(|route| {
                pattern::compile(&route.path_pattern)
                    .ok()
                    .map(|pattern| CompiledRoute { route, pattern })
            })
            .collect();
        Self { routes: compiled }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns the first route in table order whose pattern matches `path`
    /// and whose method set admits `method`.
    pub fn find(&self, method: &str, path: &str) -> Result<Arc<Route>, RouteMatchError> {
        self.routes
            .iter()
            .find(|compiled| compiled.pattern.matches(path) && compiled.route.methods.admits(method))
            .map(|compiled| compiled.route.clone())
            .ok_or_else(|| RouteMatchError::NoMatch(path.to_string()))
    }
}
