//! The registry's route wire format: the same field set as the local YAML
//! schema (`spec.md` §6) plus `route_id` and an implicit `source = remote`.

use crate::model::route::{AuthConfig, Methods, Route, Source, Target};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RouteEntry {
    route_id: String,
    path_pattern: String,
    #[serde(default = "default_methods")]
    methods: Methods,
    target_url: Option<String>,
    target_service_id: Option<String>,
    #[serde(default)]
    strip_prefix: bool,
    #[serde(default)]
    strip_path: Option<String>,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    auth_config: Option<AuthConfigEntry>,
    #[serde(default)]
    retry_non_idempotent: bool,
}

#[derive(Debug, Deserialize, Default)]
struct AuthConfigEntry {
    #[serde(default)]
    require_auth: bool,
    #[serde(default)]
    auth_service_id: Option<String>,
    #[serde(default)]
    public_paths: Vec<String>,
    #[serde(default)]
    login_redirect: Option<String>,
}

fn default_methods() -> Methods {
    Methods::Any
}

impl RouteEntry {
    pub fn into_route(self) -> Result<Route, String> {
        let target = match (self.target_url, self.target_service_id) {
            (Some(url), None) => Target::Direct(url),
            (None, Some(service_id)) => Target::Service(service_id),
            _ => return Err(format!("route {}: exactly one of target_url/target_service_id must be set", self.route_id)),
        };
        let auth_entry = self.auth_config.unwrap_or_default();
        let auth_config = AuthConfig {
            require_auth: auth_entry.require_auth,
            auth_service_id: auth_entry.auth_service_id,
            public_paths: auth_entry.public_paths,
            login_redirect: auth_entry.login_redirect,
        };
        Route::new(
            self.route_id,
            self.path_pattern,
            self.methods,
            self.priority,
            target,
            self.strip_prefix,
            self.strip_path,
            auth_config,
            Source::Remote,
            self.retry_non_idempotent,
        )
    }
}
