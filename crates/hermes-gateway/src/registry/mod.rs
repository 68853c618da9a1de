//! Registry polling: routes and per-service instance lists, fetched on an
//! interval and tolerant of the registry being unreachable.
//!
//! Grounded on `kairos-rs::services::http::RouteHandler`'s use of a shared
//! `reqwest::Client` for upstream calls, repurposed here for polling
//! `ServiceAtlas` (`spec.md` §6) instead of forwarding client traffic.

mod wire;

use crate::model::route::Route;
use crate::model::service::Instance;
use crate::route_table::RouteCache;
use ahash::RandomState;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::interval;

/// Holds the last known-good instance list per service, independent of the
/// route table so the auth plugin and proxy can resolve a `service_id`
/// target without re-parsing routes.
#[derive(Default)]
pub struct ServiceDirectory {
    instances: RwLock<HashMap<String, Vec<Instance>, RandomState>>,
}

impl ServiceDirectory {
    pub fn instances(&self, service_id: &str) -> Option<Vec<Instance>> {
        self.instances.read().unwrap().get(service_id).cloned()
    }

    fn set(&self, service_id: &str, instances: Vec<Instance>) {
        self.instances
            .write()
            .unwrap()
            .insert(service_id.to_string(), instances);
    }
}

pub struct RegistryClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("registry returned status {0}")]
    Status(u16),
}

impl RegistryClient {
    pub fn new(http: Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    pub async fn fetch_routes(&self) -> Result<Vec<Route>, RegistryError> {
        let url = format!("{}/api/v1/gateway/routes", self.base_url.trim_end_matches('/'));
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(RegistryError::Status(response.status().as_u16()));
        }
        let entries: Vec<wire::RouteEntry> = response.json().await?;
        let mut routes = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.into_route() {
                Ok(route) => routes.push(route),
                Err(message) => log::warn!("dropping malformed remote route: {message}"),
            }
        }
        Ok(routes)
    }

    pub async fn fetch_instances(&self, service_id: &str) -> Result<Vec<Instance>, RegistryError> {
        let url = format!(
            "{}/api/v1/services/{}/instances",
            self.base_url.trim_end_matches('/'),
            service_id
        );
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(RegistryError::Status(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }
}

/// Drives the periodic refresh loop: polls routes, then polls instances
/// for every `service_id` target the fetched (or local) routes reference,
/// and installs the result into `route_cache`/`directory`. Registry
/// unreachability is logged and non-fatal (`spec.md` §4.2).
pub async fn run_poll_loop(
    client: RegistryClient,
    route_cache: Arc<RouteCache>,
    directory: Arc<ServiceDirectory>,
    local_routes: Vec<Route>,
    poll_interval: Duration,
    startup_timeout: Duration,
) {
    let first_refresh = refresh_once(&client, &route_cache, &directory, local_routes.clone());
    if tokio::time::timeout(startup_timeout, first_refresh).await.is_err() {
        log::warn!("initial registry refresh exceeded {startup_timeout:?}; proceeding with local-only routing");
        route_cache.refresh(local_routes.clone(), None);
    }

    let mut ticker = interval(poll_interval);
    ticker.tick().await; // consume the immediate first tick
    loop {
        ticker.tick().await;
        refresh_once(&client, &route_cache, &directory, local_routes.clone()).await;
    }
}

async fn refresh_once(
    client: &RegistryClient,
    route_cache: &Arc<RouteCache>,
    directory: &Arc<ServiceDirectory>,
    local_routes: Vec<Route>,
) {
    match client.fetch_routes().await {
        Ok(remote_routes) => {
            let service_ids: Vec<String> = remote_routes
                .iter()
                .chain(local_routes.iter())
                .filter_map(|route| match &route.target {
                    crate::model::route::Target::Service(id) => Some(id.clone()),
                    crate::model::route::Target::Direct(_) => None,
                })
                .collect();

            for service_id in service_ids {
                match client.fetch_instances(&service_id).await {
                    Ok(instances) => directory.set(&service_id, instances),
                    Err(e) => log::warn!("failed to refresh instances for {service_id}: {e}"),
                }
            }

            route_cache.refresh(local_routes, Some(remote_routes));
        }
        Err(e) => {
            log::warn!("registry route refresh failed: {e}");
            route_cache.refresh(local_routes, None);
        }
    }
}
