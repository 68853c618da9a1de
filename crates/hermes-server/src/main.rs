//! Hermes API Gateway server binary.
//!
//! Wires `hermes_gateway`'s core onto an Actix Web `HttpServer`, grounded
//! on `kairos-gateway::main`'s assembly shape: load config, validate
//! fail-closed, build the shared handler state once, register reserved
//! paths ahead of the catch-all proxy resource, run until `Ctrl-C`.

mod health;
mod metrics;
mod proxy_handler;

use actix_web::{web, App, HttpServer};
use hermes_gateway::balancer::LoadBalancer;
use hermes_gateway::breaker::{BreakerRegistry, CircuitBreakerConfig};
use hermes_gateway::config::local_routes;
use hermes_gateway::config::Settings;
use hermes_gateway::gateway::Gateway;
use hermes_gateway::logs::configure_logger;
use hermes_gateway::plugins::auth::{AuthClient, AuthPluginConfig};
use hermes_gateway::plugins::header_transform::HeaderTransformConfig;
use hermes_gateway::plugins::Plugin;
use hermes_gateway::proxy::{ProxyConfig, ReverseProxy};
use hermes_gateway::ratelimit::{RateLimitConfig, RateLimiter};
use hermes_gateway::registry::{run_poll_loop, RegistryClient, ServiceDirectory};
use hermes_gateway::route_table::RouteCache;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    configure_logger();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("fatal configuration error: {e}");
            std::process::exit(1);
        }
    };

    info!("starting hermes-gateway v{}", env!("CARGO_PKG_VERSION"));

    let local_routes = match local_routes::load(&settings.local_routes_file) {
        Ok(routes) => routes,
        Err(e) => {
            error!("fatal: failed to load local routes file: {e}");
            std::process::exit(1);
        }
    };
    info!(
        "loaded {} local route(s) from {}",
        local_routes.len(),
        settings.local_routes_file
    );

    let route_cache = Arc::new(RouteCache::new(
        settings.local_routes_priority_boost,
        settings.fallback_to_local,
    ));
    let directory = Arc::new(ServiceDirectory::default());

    let http_client = reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build the shared registry/auth HTTP client");

    if settings.registry_enabled {
        let registry_url = settings
            .registry_url
            .clone()
            .expect("validated: registry_url is set when registry_enabled");
        let client = RegistryClient::new(http_client.clone(), registry_url);
        let route_cache = route_cache.clone();
        let directory = directory.clone();
        let local_routes_for_poll = local_routes.clone();
        let poll_interval = settings.registry_poll_interval;
        tokio::spawn(async move {
            run_poll_loop(
                client,
                route_cache,
                directory,
                local_routes_for_poll,
                poll_interval,
                poll_interval,
            )
            .await;
        });
    } else {
        // No registry configured: install the local routes as the whole
        // table, independent of `fallback_to_local` (that flag governs
        // registry *failure*, not registry being disabled).
        route_cache.refresh(local_routes.clone(), Some(Vec::new()));
    }

    let balancer = LoadBalancer::new(settings.load_balance_strategy);

    let mut plugins = Vec::new();
    plugins.push(Plugin::Auth {
        config: AuthPluginConfig {
            enabled: settings.auth_plugin_enabled,
            degrade_allow: settings.auth_degrade_allow,
        },
        client: Arc::new(AuthClient::new(http_client.clone())),
        directory: directory.clone(),
    });
    if settings.rate_limit_enabled {
        plugins.push(Plugin::RateLimit(Arc::new(RateLimiter::new(RateLimitConfig {
            global_qps: settings.rate_limit_global_qps,
            per_route_qps: settings.rate_limit_per_route_qps,
            per_ip_qps: settings.rate_limit_per_ip_qps,
            ip_map_capacity: settings.rate_limit_ip_map_capacity,
        }))));
    }
    if settings.circuit_breaker_enabled {
        plugins.push(Plugin::CircuitBreaker(Arc::new(BreakerRegistry::new(
            CircuitBreakerConfig {
                failure_threshold: settings.circuit_breaker_failure_threshold,
                reset_timeout: settings.circuit_breaker_timeout,
            },
        ))));
    }
    plugins.push(Plugin::HeaderTransform(HeaderTransformConfig::default()));

    let gateway = Arc::new(Gateway {
        route_cache,
        directory,
        balancer,
        plugins: hermes_gateway::plugins::PluginChain::new(plugins),
        proxy: ReverseProxy::new(ProxyConfig {
            max_retries: settings.proxy_max_retries,
            proxy_timeout: settings.proxy_timeout,
        }),
        proxy_timeout: settings.proxy_timeout,
    });

    let host = settings.host.clone();
    let port = settings.port;
    info!("listening on {host}:{port}");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(gateway.clone()))
            .configure(health::configure)
            .configure(metrics::configure)
            .configure(proxy_handler::configure)
    })
    .bind((host.as_str(), port))?
    .run();

    tokio::select! {
        result = server => {
            match result {
                Ok(()) => info!("server stopped gracefully"),
                Err(e) => error!("server error: {e}"),
            }
        }
        _ = signal::ctrl_c() => {
            warn!("received shutdown signal, stopping");
        }
    }

    Ok(())
}
