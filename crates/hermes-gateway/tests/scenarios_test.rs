//! Cross-cutting scenario tests exercising `Gateway::handle` end to end —
//! route precedence, path rewriting, rate limiting, and the circuit
//! breaker, each against a tiny in-process upstream. Per-component
//! behavior (load-balancer strategies, breaker state transitions, token
//! bucket math) already has focused coverage in each module's own test
//! module; these tests check the pieces actually compose.

use actix_web::http::StatusCode;
use actix_web::web::Bytes;
use hermes_gateway::balancer::{LoadBalancer, Strategy};
use hermes_gateway::breaker::{BreakerRegistry, CircuitBreakerConfig};
use hermes_gateway::plugins::auth::{AuthClient, AuthPluginConfig};
use hermes_gateway::plugins::header_transform::HeaderTransformConfig;
use hermes_gateway::plugins::{Plugin, PluginChain};
use hermes_gateway::proxy::{ProxyConfig, ReverseProxy};
use hermes_gateway::ratelimit::{RateLimitConfig, RateLimiter};
use hermes_gateway::registry::{run_poll_loop, RegistryClient, ServiceDirectory};
use hermes_gateway::route_table::RouteCache;
use hermes_gateway::{Gateway, InboundRequest, Route};
use hermes_gateway::model::route::{AuthConfig, Methods, Source, Target};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A minimal upstream that answers every connection with a fixed status
/// line, recording how many connections it accepted and the request
/// line's path, so tests can assert on gateway-side behavior (rewritten
/// path, breaker short-circuiting before the upstream is ever touched)
/// without parsing an `HttpResponse` body.
struct FakeUpstream {
    base_url: String,
    requests_seen: Arc<AtomicUsize>,
    last_path: Arc<Mutex<Option<String>>>,
}

async fn spawn_fake_upstream(status_line: &'static str) -> FakeUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let requests_seen = Arc::new(AtomicUsize::new(0));
    let last_path = Arc::new(Mutex::new(None));

    let requests_seen_task = requests_seen.clone();
    let last_path_task = last_path.clone();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => break,
            };
            requests_seen_task.fetch_add(1, Ordering::SeqCst);
            let last_path = last_path_task.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 8192];
                if let Ok(n) = socket.read(&mut buf).await {
                    if let Ok(text) = std::str::from_utf8(&buf[..n]) {
                        if let Some(request_line) = text.lines().next() {
                            if let Some(path) = request_line.split_whitespace().nth(1) {
                                *last_path.lock().unwrap() = Some(path.to_string());
                            }
                        }
                    }
                }
                let body = "ok";
                let response = format!(
                    "HTTP/1.1 {status_line}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    FakeUpstream {
        base_url,
        requests_seen,
        last_path,
    }
}

fn direct_route(id: &str, pattern: &str, priority: i32, source: Source, target_url: &str, strip_prefix: bool) -> Route {
    Route::new(
        id.to_string(),
        pattern.to_string(),
        Methods::Any,
        priority,
        Target::Direct(target_url.to_string()),
        strip_prefix,
        None,
        AuthConfig::default(),
        source,
        false,
    )
    .unwrap()
}

fn test_gateway(route_cache: Arc<RouteCache>, plugins: Vec<Plugin>) -> Gateway {
    Gateway {
        route_cache,
        directory: Arc::new(ServiceDirectory::default()),
        balancer: LoadBalancer::new(Strategy::RoundRobin),
        plugins: PluginChain::new(plugins),
        proxy: ReverseProxy::new(ProxyConfig {
            max_retries: 0,
            proxy_timeout: Duration::from_secs(2),
        }),
        proxy_timeout: Duration::from_secs(2),
    }
}

fn inbound(method: &str, path: &str) -> InboundRequest {
    InboundRequest {
        request_id: "test-request".to_string(),
        client_ip: "203.0.113.7".to_string(),
        method: method.to_string(),
        path: path.to_string(),
        query: String::new(),
        headers: Vec::new(),
        scheme: "http".to_string(),
        host: "gateway.local".to_string(),
        body: Bytes::new(),
    }
}

fn header_transform_only() -> Vec<Plugin> {
    vec![Plugin::HeaderTransform(HeaderTransformConfig::default())]
}

#[tokio::test]
async fn local_route_wins_over_equal_priority_remote_route() {
    let local_upstream = spawn_fake_upstream("200 OK").await;
    let remote_upstream = spawn_fake_upstream("200 OK").await;

    let route_cache = Arc::new(RouteCache::new(1000, true));
    route_cache.refresh(
        vec![direct_route("local", "/orders/*", 0, Source::Local, &local_upstream.base_url, false)],
        Some(vec![direct_route(
            "remote",
            "/orders/*",
            1000,
            Source::Remote,
            &remote_upstream.base_url,
            false,
        )]),
    );

    let gateway = test_gateway(route_cache, header_transform_only());
    let response = gateway.handle(inbound("GET", "/orders/42")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(local_upstream.requests_seen.load(Ordering::SeqCst), 1);
    assert_eq!(remote_upstream.requests_seen.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn strip_prefix_rewrites_the_path_forwarded_upstream() {
    let upstream = spawn_fake_upstream("200 OK").await;
    let route_cache = Arc::new(RouteCache::new(0, true));
    route_cache.refresh(
        vec![direct_route("api", "/api/**", 0, Source::Local, &upstream.base_url, true)],
        Some(Vec::new()),
    );

    let gateway = test_gateway(route_cache, header_transform_only());
    let response = gateway.handle(inbound("GET", "/api/widgets/1")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(upstream.last_path.lock().unwrap().as_deref(), Some("/widgets/1"));
}

#[tokio::test]
async fn rate_limiter_denies_once_the_burst_is_exhausted() {
    let upstream = spawn_fake_upstream("200 OK").await;
    let route_cache = Arc::new(RouteCache::new(0, true));
    route_cache.refresh(
        vec![direct_route("limited", "/limited/**", 0, Source::Local, &upstream.base_url, false)],
        Some(Vec::new()),
    );

    let limiter = RateLimiter::new(RateLimitConfig {
        global_qps: 1.0,
        per_route_qps: 100.0,
        per_ip_qps: 100.0,
        ip_map_capacity: 10,
    });
    let plugins = vec![
        Plugin::RateLimit(Arc::new(limiter)),
        Plugin::HeaderTransform(HeaderTransformConfig::default()),
    ];
    let gateway = test_gateway(route_cache, plugins);

    let first = gateway.handle(inbound("GET", "/limited/1")).await;
    let second = gateway.handle(inbound("GET", "/limited/1")).await;

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(upstream.requests_seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn circuit_breaker_opens_after_the_threshold_and_stops_calling_upstream() {
    let upstream = spawn_fake_upstream("500 Internal Server Error").await;
    let route_cache = Arc::new(RouteCache::new(0, true));
    route_cache.refresh(
        vec![direct_route("flaky", "/flaky/**", 0, Source::Local, &upstream.base_url, false)],
        Some(Vec::new()),
    );

    let registry = BreakerRegistry::new(CircuitBreakerConfig {
        failure_threshold: 2,
        reset_timeout: Duration::from_secs(60),
    });
    let plugins = vec![
        Plugin::CircuitBreaker(Arc::new(registry)),
        Plugin::HeaderTransform(HeaderTransformConfig::default()),
    ];
    let gateway = test_gateway(route_cache, plugins);

    let first = gateway.handle(inbound("GET", "/flaky/1")).await;
    let second = gateway.handle(inbound("GET", "/flaky/1")).await;
    let third = gateway.handle(inbound("GET", "/flaky/1")).await;

    assert_eq!(first.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(second.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(third.status(), StatusCode::SERVICE_UNAVAILABLE);
    // The third call was rejected by the open breaker before ever dialing
    // the upstream.
    assert_eq!(upstream.requests_seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unreachable_registry_falls_back_to_local_routes_without_blocking_startup() {
    let route_cache = Arc::new(RouteCache::new(0, true));
    let directory = Arc::new(ServiceDirectory::default());
    let local_routes = vec![direct_route("local", "/svc/**", 0, Source::Local, "http://127.0.0.1:1", false)];

    // Port 1 on loopback refuses connections immediately, simulating a
    // registry that's down rather than merely slow.
    let client = RegistryClient::new(reqwest::Client::new(), "http://127.0.0.1:1".to_string());

    // `run_poll_loop` never returns; bound it so the test only observes the
    // outcome of the first refresh attempt.
    let _ = tokio::time::timeout(
        Duration::from_millis(500),
        run_poll_loop(
            client,
            route_cache.clone(),
            directory,
            local_routes,
            Duration::from_secs(60),
            Duration::from_millis(200),
        ),
    )
    .await;

    assert!(route_cache.is_bootstrapped());
    let table = route_cache.current();
    assert_eq!(table.route_count, 1);
    assert!(table.matcher.find("GET", "/svc/anything").is_ok());
}

#[tokio::test]
async fn unmatched_path_returns_no_match_before_any_plugin_runs() {
    let route_cache = Arc::new(RouteCache::new(0, true));
    route_cache.refresh(Vec::new(), Some(Vec::new()));
    let gateway = test_gateway(route_cache, header_transform_only());

    let response = gateway.handle(inbound("GET", "/nowhere")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn disabled_auth_plugin_never_calls_out_even_when_route_requires_it() {
    let upstream = spawn_fake_upstream("200 OK").await;
    let route_cache = Arc::new(RouteCache::new(0, true));
    let mut route = direct_route("secured", "/secured/**", 0, Source::Local, &upstream.base_url, false);
    route.auth_config.require_auth = true;
    route.auth_config.auth_service_id = Some("auth-svc".to_string());
    route_cache.refresh(vec![route], Some(Vec::new()));

    let plugins = vec![
        Plugin::Auth {
            config: AuthPluginConfig {
                enabled: false,
                degrade_allow: false,
            },
            client: Arc::new(AuthClient::new(reqwest::Client::new())),
            directory: Arc::new(ServiceDirectory::default()),
        },
        Plugin::HeaderTransform(HeaderTransformConfig::default()),
    ];
    let gateway = test_gateway(route_cache, plugins);

    let response = gateway.handle(inbound("GET", "/secured/1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(upstream.requests_seen.load(Ordering::SeqCst), 1);
}
