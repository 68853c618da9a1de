//! Gateway-facing error types with HTTP response mapping.
//!
//! Grounded on `kairos-rs::models::error::GatewayError`, expanded to the
//! full variant set `spec.md` §7 requires.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no route matches path: {path}")]
    NoMatch { path: String },

    #[error("authentication required")]
    AuthRequired { login_redirect: Option<String> },

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("circuit open for target: {target}")]
    CircuitOpen { target: String },

    #[error("no healthy instance for service: {service_id}")]
    NoHealthyInstance { service_id: String },

    #[error("upstream timed out after {timeout_secs}s")]
    UpstreamTimeout { timeout_secs: u64 },

    #[error("upstream transport error: {message}")]
    UpstreamTransport { message: String },

    #[error("auth service unavailable")]
    AuthUnavailable,

    #[error("invalid route configuration: {message}")]
    Config { message: String },
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::NoMatch { .. } => StatusCode::NOT_FOUND,
            GatewayError::AuthRequired { login_redirect } => {
                if login_redirect.is_some() {
                    StatusCode::FOUND
                } else {
                    StatusCode::UNAUTHORIZED
                }
            }
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::NoHealthyInstance { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamTransport { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::AuthUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Config { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        match self {
            GatewayError::NoMatch { path } => {
                builder.json(json!({ "error": "no_route", "path": path }))
            }
            GatewayError::AuthRequired { login_redirect } => {
                if let Some(redirect) = login_redirect {
                    builder.insert_header(("Location", redirect.as_str()));
                    builder.finish()
                } else {
                    builder.json(json!({ "error": "auth_required" }))
                }
            }
            GatewayError::RateLimited { retry_after_secs } => {
                builder.insert_header(("Retry-After", retry_after_secs.to_string()));
                builder.json(json!({ "error": "rate_limited" }))
            }
            GatewayError::CircuitOpen { .. } | GatewayError::NoHealthyInstance { .. } => {
                builder.json(json!({ "error": "upstream_unavailable" }))
            }
            GatewayError::AuthUnavailable => builder.json(json!({ "error": "auth_unavailable" })),
            GatewayError::UpstreamTimeout { .. } => {
                builder.json(json!({ "error": "upstream_timeout" }))
            }
            GatewayError::UpstreamTransport { message } => {
                builder.json(json!({ "error": "upstream_transport", "message": message }))
            }
            GatewayError::Config { message } => {
                builder.json(json!({ "error": "config_error", "message": message }))
            }
        }
    }
}
