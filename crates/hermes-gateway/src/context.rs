//! The request context threaded through the plugin chain and proxy.
//!
//! Grounded on `spec.md` §9's recognized-field record; there is no teacher
//! analogue since `kairos-rs` passes `HttpRequest`/`web::Bytes` directly
//! through its handler instead of an explicit context type.

use crate::model::route::Route;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-request scratch space, indexed by plugin name. The only mutable
/// slot in the context (`spec.md` §9).
#[derive(Default)]
pub struct PluginScratch(HashMap<String, Box<dyn Any + Send>>);

impl PluginScratch {
    pub fn insert(&mut self, plugin: &str, value: Box<dyn Any + Send>) {
        self.0.insert(plugin.to_string(), value);
    }

    pub fn get<T: Any>(&self, plugin: &str) -> Option<&T> {
        self.0.get(plugin).and_then(|v| v.downcast_ref())
    }

    /// Removes and returns the stored value, consuming it by value — used
    /// for the circuit breaker's `BreakerPermit`, which must be resolved
    /// exactly once.
    pub fn take<T: Any + Send>(&mut self, plugin: &str) -> Option<Box<T>> {
        self.0.remove(plugin).and_then(|v| v.downcast::<T>().ok())
    }
}

pub struct RequestContext {
    pub request_id: String,
    pub client_ip: String,
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub matched_route: Option<Arc<Route>>,
    pub start_time: Instant,
    pub deadline: Instant,
    pub plugin_scratch: PluginScratch,
}

impl RequestContext {
    pub fn new(request_id: String, client_ip: String, method: String, path: String, headers: Vec<(String, String)>, proxy_timeout: Duration) -> Self {
        let start_time = Instant::now();
        Self {
            request_id,
            client_ip,
            method,
            path,
            headers,
            matched_route: None,
            start_time,
            deadline: start_time + proxy_timeout,
            plugin_scratch: PluginScratch::default(),
        }
    }

    pub fn remaining_budget(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
