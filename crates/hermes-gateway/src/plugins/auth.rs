//! Authentication plugin: delegates the actual credential check to an
//! external auth service resolved through the registry, the way
//! `kairos-rs`'s JWT middleware delegates to a shared secret — here the
//! verification itself is an out-of-scope external collaborator
//! (`spec.md` §1), so the plugin's job is orchestration: public-path
//! bypass, presence check, the degrade-on-unavailable policy, and the
//! 401/302 decision.

use crate::balancer::LoadBalancer;
use crate::model::error::GatewayError;
use crate::model::route::Route;
use crate::registry::ServiceDirectory;
use reqwest::Client;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct AuthPluginConfig {
    pub enabled: bool,
    pub degrade_allow: bool,
}

/// Calls an auth service's verification endpoint with the inbound
/// `Authorization` header forwarded, interpreting 2xx as authenticated and
/// 401/403 as rejected. The endpoint path is a gateway convention, not
/// negotiated with the registry.
pub struct AuthClient {
    http: Client,
}

#[derive(Debug, PartialEq, Eq)]
pub enum AuthDecision {
    Authenticated,
    Rejected,
}

impl AuthClient {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    pub async fn verify(&self, base_url: &str, authorization: Option<&str>) -> Result<AuthDecision, GatewayError> {
        let mut request = self.http.get(format!("{}/verify", base_url.trim_end_matches('/')));
        if let Some(header) = authorization {
            request = request.header("authorization", header);
        }

        let response = request
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|_| GatewayError::AuthUnavailable)?;

        if response.status().is_success() {
            Ok(AuthDecision::Authenticated)
        } else if response.status().as_u16() == 401 || response.status().as_u16() == 403 {
            Ok(AuthDecision::Rejected)
        } else {
            Err(GatewayError::AuthUnavailable)
        }
    }
}

/// Decides whether a request may proceed. Returns `Ok(())` to continue,
/// `Err(GatewayError::AuthRequired | AuthUnavailable)` to short-circuit.
pub async fn check(
    config: &AuthPluginConfig,
    client: &AuthClient,
    balancer: &LoadBalancer,
    directory: &ServiceDirectory,
    route: &Route,
    path: &str,
    authorization: Option<&str>,
) -> Result<(), GatewayError> {
    if !config.enabled || !route.auth_config.require_auth {
        return Ok(());
    }
    if route.is_public_path(path) {
        return Ok(());
    }

    let Some(auth_service_id) = route.auth_config.auth_service_id.as_deref() else {
        return Err(GatewayError::Config {
            message: format!("route {} requires auth but has no auth_service_id", route.route_id),
        });
    };

    if authorization.is_none() {
        return Err(GatewayError::AuthRequired {
            login_redirect: route.auth_config.login_redirect.clone(),
        });
    }

    // The auth service is itself addressed as a service target; reuse the
    // balancer so its instance pool benefits from the same health/LB
    // discipline as any other upstream.
    let instance = directory
        .instances(auth_service_id)
        .and_then(|instances| balancer.pick(auth_service_id, &instances).ok());

    let instance = match instance {
        Some(instance) => instance,
        None => {
            return if config.degrade_allow {
                Ok(())
            } else {
                Err(GatewayError::AuthUnavailable)
            }
        }
    };

    let decision = client.verify(&instance.base_url, authorization).await;
    balancer.release(&instance.key());

    match decision {
        Ok(AuthDecision::Authenticated) => Ok(()),
        Ok(AuthDecision::Rejected) => Err(GatewayError::AuthRequired {
            login_redirect: route.auth_config.login_redirect.clone(),
        }),
        Err(_) if config.degrade_allow => Ok(()),
        Err(e) => Err(e),
    }
}
