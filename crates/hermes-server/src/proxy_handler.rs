//! The catch-all resource that feeds every non-reserved path into
//! `hermes_gateway::Gateway::handle`.
//!
//! Grounded on `kairos-rs::routes::http::configure_route`'s
//! `/{tail:.*}` catch-all resource and payload-size limits, adapted to
//! build a `hermes_gateway::InboundRequest` instead of calling
//! `RouteHandler` directly. Request-ID stamping (`spec.md` §2) happens
//! here rather than as a separate Actix `Transform` middleware, since the
//! ID is needed on the same `InboundRequest` this handler already builds.

use actix_web::{web, HttpRequest, HttpResponse};
use hermes_gateway::Gateway;
use std::sync::Arc;
use uuid::Uuid;

pub async fn handle(
    req: HttpRequest,
    body: web::Bytes,
    gateway: web::Data<Arc<Gateway>>,
) -> HttpResponse {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let client_ip = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();

    let headers = req
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let connection_info = req.connection_info().clone();
    let scheme = connection_info.scheme().to_string();
    let host = connection_info.host().to_string();

    let inbound = hermes_gateway::InboundRequest {
        request_id,
        client_ip,
        method: req.method().as_str().to_string(),
        path: req.path().to_string(),
        query: if req.query_string().is_empty() {
            String::new()
        } else {
            format!("?{}", req.query_string())
        },
        headers,
        scheme,
        host,
        body,
    };

    gateway.handle(inbound).await
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(16 * 1024 * 1024))
        .service(web::resource("/{tail:.*}").to(handle));
}
