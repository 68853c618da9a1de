//! Wires the route cache, plugin chain, load balancer, and reverse proxy
//! into the single request pipeline `spec.md` §2 describes.
//!
//! Grounded on `kairos-gateway::main`'s assembly of `RouteHandler` plus its
//! `.wrap(...)` middleware stack into one Actix `App`; here the equivalent
//! assembly is a plain struct rather than a stack of Actix middleware,
//! matching `spec.md` §9's closed, explicit plugin chain.
//!
//! Design note (recorded in `DESIGN.md`): `spec.md` §2's prose orders
//! "plugin before, then matcher, then balancer"; but §4.4's `before(ctx)`
//! contract and §9's `ctx.matched_route?` field only make sense if the
//! route is already resolved when `before` runs (per-route rate limits,
//! per-route auth config, and the breaker's target key all need it). This
//! implementation matches the route first and stores it on the context,
//! then runs the plugin chain — `NoMatch` short-circuits before any
//! plugin executes, exactly as if matching were itself the first,
//! unconditional step of the pipeline.

use crate::balancer::LoadBalancer;
use crate::context::RequestContext;
use crate::model::error::GatewayError;
use crate::model::route::Target as RouteTarget;
use crate::plugins::{PluginChain, RequestOutcome};
use crate::proxy::{ForwardedOrigin, ReverseProxy, Target as ProxyTarget};
use crate::registry::ServiceDirectory;
use crate::route_table::RouteCache;
use actix_web::web::Bytes;
use actix_web::HttpResponse;
use std::sync::Arc;
use std::time::Duration;

pub struct Gateway {
    pub route_cache: Arc<RouteCache>,
    pub directory: Arc<ServiceDirectory>,
    pub balancer: LoadBalancer,
    pub plugins: PluginChain,
    pub proxy: ReverseProxy,
    pub proxy_timeout: Duration,
}

/// Everything about the inbound HTTP request the gateway needs that isn't
/// already carried by `RequestContext` (which is policy-facing, not
/// transport-facing).
pub struct InboundRequest {
    pub request_id: String,
    pub client_ip: String,
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: Vec<(String, String)>,
    pub scheme: String,
    pub host: String,
    pub body: Bytes,
}

impl Gateway {
    /// Runs the full pipeline for one request: match, plugin `before`,
    /// proxy, plugin `after`. Reserved paths (`/health`, `/metrics`) are
    /// handled by the caller before this is ever invoked (`spec.md` §6).
    pub async fn handle(&self, inbound: InboundRequest) -> HttpResponse {
        let mut ctx = RequestContext::new(
            inbound.request_id,
            inbound.client_ip,
            inbound.method,
            inbound.path,
            inbound.headers,
            self.proxy_timeout,
        );

        let table = self.route_cache.current();
        let route = match table.matcher.find(&ctx.method, &ctx.path) {
            Ok(route) => route,
            Err(_) => {
                return GatewayError::NoMatch {
                    path: ctx.path.clone(),
                }
                .error_response()
            }
        };
        ctx.matched_route = Some(route.clone());

        let (executed, before_err) = self.plugins.run_before(&mut ctx, &route, &self.balancer).await;

        if let Some(err) = before_err {
            let mut response = err.error_response();
            self.plugins.run_after(&mut ctx, &executed, RequestOutcome::Failure, &mut response);
            return response;
        }

        let target = match &route.target {
            RouteTarget::Direct(url) => ProxyTarget::Direct(url.as_str()),
            RouteTarget::Service(service_id) => match self.directory.instances(service_id) {
                Some(instances) if !instances.is_empty() => ProxyTarget::Service {
                    service_id: service_id.as_str(),
                    instances,
                },
                _ => {
                    let mut response = GatewayError::NoHealthyInstance {
                        service_id: service_id.clone(),
                    }
                    .error_response();
                    self.plugins.run_after(&mut ctx, &executed, RequestOutcome::Success, &mut response);
                    return response;
                }
            },
        };

        let origin = ForwardedOrigin {
            scheme: &inbound.scheme,
            host: &inbound.host,
        };

        let method = ctx.method.clone();
        let result = self
            .proxy
            .forward(&route, target, &self.balancer, &ctx, &method, &inbound.query, origin, inbound.body)
            .await;

        let (mut response, outcome) = match result {
            Ok(response) => {
                let outcome = if response.status().is_server_error() {
                    RequestOutcome::Failure
                } else {
                    RequestOutcome::Success
                };
                (response, outcome)
            }
            Err(err @ GatewayError::NoHealthyInstance { .. }) => (err.error_response(), RequestOutcome::Success),
            Err(err) => (err.error_response(), RequestOutcome::Failure),
        };

        self.plugins.run_after(&mut ctx, &executed, outcome, &mut response);
        response
    }
}
