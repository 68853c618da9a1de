//! `/health`: a minimal liveness/status endpoint.
//!
//! Grounded on `kairos-rs::routes::health::health_check`; the richer
//! readiness/liveness split the teacher exposes (`/ready`, `/live`) is out
//! of scope per `spec.md` §1 ("`/health`... treated only via the
//! interfaces the core consumes").

use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check));
}
