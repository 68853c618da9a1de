//! Parsing for the local routes YAML file (`spec.md` §6).

use crate::model::route::{AuthConfig, Methods, Route, Source, Target};
use serde::Deserialize;

/// The on-disk shape of one route entry: `target_url` and
/// `target_service_id` are mutually exclusive, matched against the raw
/// YAML fields before being collapsed into a `Target`.
#[derive(Debug, Deserialize)]
struct RouteFileEntry {
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
    auth_config: Option<AuthConfigFile>,
    #[serde(default)]
    retry_non_idempotent: bool,
}

#[derive(Debug, Deserialize, Default)]
struct AuthConfigFile {
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

#[derive(Debug, Deserialize)]
pub struct LocalRoutesFile {
    #[serde(default)]
    routes: Vec<RouteFileEntry>,
    #[serde(default)]
    default_auth_config: Option<AuthConfigFile>,
}

#[derive(Debug, thiserror::Error)]
pub enum LocalRoutesError {
    #[error("failed to read local routes file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse local routes file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("route {route_id}: {message}")]
    InvalidRoute { route_id: String, message: String },
    #[error("route {index}: exactly one of target_url / target_service_id must be set")]
    AmbiguousTarget { index: usize },
}

/// Loads and validates `path`, producing `Route`s with `source = Local`
/// (the priority boost is applied by the caller, at merge time, not here).
pub fn load(path: &str) -> Result<Vec<Route>, LocalRoutesError> {
    let contents = std::fs::read_to_string(path).map_err(|source| LocalRoutesError::Io {
        path: path.to_string(),
        source,
    })?;
    parse(&contents)
}

fn parse(contents: &str) -> Result<Vec<Route>, LocalRoutesError> {
    let file: LocalRoutesFile = serde_yaml::from_str(contents).map_err(|source| LocalRoutesError::Parse {
        path: "<local routes>".to_string(),
        source,
    })?;

    let default_auth = file.default_auth_config.unwrap_or_default();

    file.routes
        .into_iter()
        .enumerate()
        .map(|(index, entry)| build_route(index, entry, &default_auth))
        .collect()
}

fn build_route(
    index: usize,
    entry: RouteFileEntry,
    default_auth: &AuthConfigFile,
) -> Result<Route, LocalRoutesError> {
    let target = match (entry.target_url, entry.target_service_id) {
        (Some(url), None) => Target::Direct(url),
        (None, Some(service_id)) => Target::Service(service_id),
        _ => return Err(LocalRoutesError::AmbiguousTarget { index }),
    };

    let auth_file = entry.auth_config.unwrap_or_else(|| AuthConfigFile {
        require_auth: default_auth.require_auth,
        auth_service_id: default_auth.auth_service_id.clone(),
        public_paths: default_auth.public_paths.clone(),
        login_redirect: default_auth.login_redirect.clone(),
    });
    let auth_config = AuthConfig {
        require_auth: auth_file.require_auth,
        auth_service_id: auth_file.auth_service_id,
        public_paths: auth_file.public_paths,
        login_redirect: auth_file.login_redirect,
    };

    let route_id = format!("local-{index}");
    Route::new(
        route_id.clone(),
        entry.path_pattern,
        entry.methods,
        entry.priority,
        target,
        entry.strip_prefix,
        entry.strip_path,
        auth_config,
        Source::Local,
        entry.retry_non_idempotent,
    )
    .map_err(|message| LocalRoutesError::InvalidRoute { route_id, message })
}
