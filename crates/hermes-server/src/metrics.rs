//! `/metrics`: a minimal Prometheus-text placeholder.
//!
//! Full Prometheus rendering is a named out-of-scope collaborator
//! (`spec.md` §1); this exposes just enough so the reserved path resolves
//! and monitoring that merely checks reachability/content-type succeeds,
//! grounded on the exposition format `kairos-rs::routes::metrics` renders
//! in full.

use actix_web::{web, HttpResponse};

pub async fn metrics() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body("# hermes_gateway_up 1\n")
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics));
}
