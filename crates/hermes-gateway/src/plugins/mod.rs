//! The plugin chain: a closed set of cross-cutting policies dispatched by
//! priority, `before` ascending / `after` descending, with short-circuit on
//! the first `before` that errors.
//!
//! `spec.md` §9 is explicit that this is "a closed variant list... not
//! runtime registration", so unlike `kairos-rs`'s `dyn LoadBalancer` / Actix
//! `Transform` trait-object middleware stack, the chain here is a plain
//! `enum` matched in a loop — new plugins are added by extending the
//! variant, never by registering a trait object at runtime.

pub mod auth;
pub mod header_transform;

use crate::balancer::LoadBalancer;
use crate::breaker::{BreakerPermit, BreakerRegistry};
use crate::context::RequestContext;
use crate::model::error::GatewayError;
use crate::model::route::Route;
use crate::ratelimit::RateLimiter;
use crate::registry::ServiceDirectory;
use auth::{AuthClient, AuthPluginConfig};
use header_transform::HeaderTransformConfig;
use std::sync::Arc;

/// Whether the upstream call (or circuit-open/no-instance short-circuit)
/// should count as a breaker failure. 5xx and transport errors are
/// failures; 4xx is a success for the breaker (`spec.md` §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    Failure,
}

pub enum Plugin {
    Auth {
        config: AuthPluginConfig,
        client: Arc<AuthClient>,
        directory: Arc<ServiceDirectory>,
    },
    RateLimit(Arc<RateLimiter>),
    CircuitBreaker(Arc<BreakerRegistry>),
    HeaderTransform(HeaderTransformConfig),
}

impl Plugin {
    pub fn priority(&self) -> i32 {
        match self {
            Plugin::Auth { .. } => 50,
            Plugin::RateLimit(_) => 100,
            Plugin::CircuitBreaker(_) => 200,
            Plugin::HeaderTransform(_) => 300,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Plugin::Auth { .. } => "auth",
            Plugin::RateLimit(_) => "rate_limit",
            Plugin::CircuitBreaker(_) => "circuit_breaker",
            Plugin::HeaderTransform(_) => "header_transform",
        }
    }

    async fn before(&self, ctx: &mut RequestContext, route: &Route, balancer: &LoadBalancer) -> Result<(), GatewayError> {
        match self {
            Plugin::Auth { config, client, directory } => {
                let authorization = ctx.header("authorization").map(|s| s.to_string());
                auth::check(config, client, balancer, directory, route, &ctx.path, authorization.as_deref()).await
            }
            Plugin::RateLimit(limiter) => limiter
                .allow(&route.route_id, &ctx.client_ip)
                .map_err(|denied| GatewayError::RateLimited {
                    retry_after_secs: denied.retry_after_secs,
                }),
            Plugin::CircuitBreaker(registry) => {
                let breaker = registry.get_or_create(route.target.key());
                match breaker.try_acquire() {
                    Ok(permit) => {
                        ctx.plugin_scratch.insert(self.name(), Box::new(permit));
                        Ok(())
                    }
                    Err(_) => Err(GatewayError::CircuitOpen {
                        target: route.target.key().to_string(),
                    }),
                }
            }
            Plugin::HeaderTransform(_) => Ok(()),
        }
    }

    fn after(&self, ctx: &mut RequestContext, outcome: RequestOutcome, response: &mut actix_web::HttpResponse) {
        match self {
            Plugin::CircuitBreaker(_) => {
                if let Some(permit) = ctx.plugin_scratch.take::<BreakerPermit>(self.name()) {
                    match outcome {
                        RequestOutcome::Success => permit.success(),
                        RequestOutcome::Failure => permit.failure(),
                    }
                }
            }
            Plugin::HeaderTransform(config) => config.apply(response),
            Plugin::Auth { .. } | Plugin::RateLimit(_) => {}
        }
    }
}

/// The fixed plugin list, sorted ascending by priority at construction so
/// `before`/`after` only need to walk it forward/backward.
pub struct PluginChain {
    plugins: Vec<Plugin>,
}

impl PluginChain {
    pub fn new(mut plugins: Vec<Plugin>) -> Self {
        plugins.sort_by_key(|p| p.priority());
        Self { plugins }
    }

    /// Runs `before` ascending. On the first error, returns it along with
    /// the indices of plugins whose `before` actually executed (the
    /// failing one included), so the caller can run `after` only for those,
    /// in reverse order.
    pub async fn run_before(
        &self,
        ctx: &mut RequestContext,
        route: &Route,
        balancer: &LoadBalancer,
    ) -> (Vec<usize>, Option<GatewayError>) {
        let mut executed = Vec::with_capacity(self.plugins.len());
        for (index, plugin) in self.plugins.iter().enumerate() {
            executed.push(index);
            if let Err(e) = plugin.before(ctx, route, balancer).await {
                return (executed, Some(e));
            }
        }
        (executed, None)
    }

    /// Runs `after` in descending priority order, but only for the plugin
    /// indices `before` actually invoked.
    pub fn run_after(
        &self,
        ctx: &mut RequestContext,
        executed: &[usize],
        outcome: RequestOutcome,
        response: &mut actix_web::HttpResponse,
    ) {
        for &index in executed.iter().rev() {
            self.plugins[index].after(ctx, outcome, response);
        }
    }
}
