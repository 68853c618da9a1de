//! The reverse proxy: forwards a matched request to a resolved instance,
//! rewrites headers and path, retries transient failures within a single
//! wall-clock budget, and streams the upstream response back.
//!
//! Grounded on `kairos-rs::services::http::RouteHandler::handle_request`
//! (pooled `reqwest::Client`, method/header conversion, per-request
//! timeout), generalized to `spec.md` §4.7's requirements: the exact
//! hop-by-hop header set, `strip_prefix`/`strip_path` rewriting, a shared
//! (not per-attempt) timeout budget, and non-idempotent-method retry
//! gating.

mod headers;
mod path;

use crate::balancer::LoadBalancer;
use crate::context::RequestContext;
use crate::model::error::GatewayError;
use crate::model::route::Route;
use crate::model::service::Instance;
use actix_web::http::StatusCode;
use actix_web::web::Bytes;
use actix_web::HttpResponse;
use futures_util::TryStreamExt;
use reqwest::{Client, Method};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ProxyConfig {
    pub max_retries: u32,
    pub proxy_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            proxy_timeout: Duration::from_secs(30),
        }
    }
}

/// Where the request is going this attempt: a fixed URL, or a service
/// whose healthy instances are re-picked from `balancer` on every retry
/// (`spec.md` §4.7: "a fresh balancer pick each attempt").
pub enum Target<'a> {
    Direct(&'a str),
    Service {
        service_id: &'a str,
        instances: Vec<Instance>,
    },
}

enum AttemptError {
    Timeout,
    Transport(String),
}

/// Request-scoped context the proxy needs but that `RequestContext`
/// doesn't carry (it is policy-facing, not transport-facing): the scheme
/// and host the gateway itself was reached on, used for
/// `X-Forwarded-Proto`/`X-Forwarded-Host`.
pub struct ForwardedOrigin<'a> {
    pub scheme: &'a str,
    pub host: &'a str,
}

pub struct ReverseProxy {
    http: Client,
    config: ProxyConfig,
}

impl ReverseProxy {
    pub fn new(config: ProxyConfig) -> Self {
        let http = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(32)
            .build()
            .expect("failed to build the upstream HTTP client");
        Self { http, config }
    }

    /// Forwards `method path?query` with `body` to `target`, retrying on
    /// transport error or 502/503/504 up to `max_retries` times, subject to
    /// `route`'s idempotency gating and the shared `proxy_timeout` budget
    /// tracked by `ctx.deadline`.
    pub async fn forward(
        &self,
        route: &Route,
        target: Target<'_>,
        balancer: &LoadBalancer,
        ctx: &RequestContext,
        method: &str,
        query: &str,
        origin: ForwardedOrigin<'_>,
        body: Bytes,
    ) -> Result<HttpResponse, GatewayError> {
        let retryable = is_retryable(method, route.retry_non_idempotent);
        let max_attempts = if retryable { self.config.max_retries + 1 } else { 1 };
        let rewritten_path = path::rewrite(route, &ctx.path);

        let mut last_error = None;
        for attempt in 0..max_attempts {
            let budget = ctx.remaining_budget();
            if budget.is_zero() {
                return Err(timeout_error(self.config.proxy_timeout));
            }

            let (instance_key, base_url) = match &target {
                Target::Direct(url) => (None, (*url).to_string()),
                Target::Service {
                    service_id,
                    instances,
                } => match balancer.pick(service_id, &instances) {
                    Ok(instance) => (Some(instance.key()), instance.base_url.clone()),
                    Err(e) => return Err(GatewayError::NoHealthyInstance { service_id: e.0 }),
                },
            };

            let url = format!(
                "{}{}{}",
                base_url.trim_end_matches('/'),
                rewritten_path,
                query
            );

            let attempt_result = self
                .attempt(&url, method, &body, ctx, &origin, budget)
                .await;

            if let Some(key) = &instance_key {
                balancer.release(key);
            }

            match attempt_result {
                Ok(response) => {
                    let status = response.status();
                    if should_retry_status(status) && attempt + 1 < max_attempts {
                        last_error = Some(GatewayError::UpstreamTransport {
                            message: format!("upstream returned {status}"),
                        });
                        continue;
                    }
                    return translate_response(response).await;
                }
                Err(AttemptError::Timeout) => {
                    let err = timeout_error(self.config.proxy_timeout);
                    if attempt + 1 < max_attempts {
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(AttemptError::Transport(message)) => {
                    let err = GatewayError::UpstreamTransport { message };
                    if attempt + 1 < max_attempts {
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }

        Err(last_error.unwrap_or(GatewayError::UpstreamTransport {
            message: "retries exhausted".to_string(),
        }))
    }

    async fn attempt(
        &self,
        url: &str,
        method: &str,
        body: &Bytes,
        ctx: &RequestContext,
        origin: &ForwardedOrigin<'_>,
        budget: Duration,
    ) -> Result<reqwest::Response, AttemptError> {
        let reqwest_method = parse_method(method);
        let upstream_headers = headers::build_upstream_headers(
            &ctx.headers,
            &ctx.client_ip,
            origin.scheme,
            origin.host,
            &ctx.request_id,
        );

        let request = self
            .http
            .request(reqwest_method, url)
            .headers(upstream_headers)
            .body(body.to_vec());

        match tokio::time::timeout(budget, request.send()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(AttemptError::Transport(e.to_string())),
            Err(_) => Err(AttemptError::Timeout),
        }
    }
}

fn timeout_error(timeout: Duration) -> GatewayError {
    GatewayError::UpstreamTimeout {
        timeout_secs: timeout.as_secs(),
    }
}

/// Safe methods are always retry-eligible; everything else needs the
/// route's explicit opt-in (`spec.md` §4.7, §9 Open Question: PUT/DELETE
/// default to non-idempotent alongside POST/PATCH).
fn is_retryable(method: &str, retry_non_idempotent: bool) -> bool {
    match method.to_ascii_uppercase().as_str() {
        "GET" | "HEAD" | "OPTIONS" => true,
        _ => retry_non_idempotent,
    }
}

fn should_retry_status(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 502 | 503 | 504)
}

fn parse_method(method: &str) -> Method {
    Method::from_bytes(method.as_bytes()).unwrap_or(Method::GET)
}

/// Streams the upstream response body to the client as bytes arrive
/// rather than buffering it fully (`spec.md` §4.7).
async fn translate_response(response: reqwest::Response) -> Result<HttpResponse, GatewayError> {
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = HttpResponse::build(status);

    for (name, value) in response.headers() {
        let lower = name.as_str().to_ascii_lowercase();
        if matches!(
            lower.as_str(),
            "connection" | "keep-alive" | "transfer-encoding" | "upgrade" | "content-length"
        ) {
            continue;
        }
        if let Ok(value) = actix_web::http::header::HeaderValue::from_bytes(value.as_bytes()) {
            builder.insert_header((name.as_str(), value));
        }
    }

    let stream = response
        .bytes_stream()
        .map_err(|e| actix_web::error::ErrorBadGateway(e.to_string()));
    Ok(builder.streaming(stream))
}
