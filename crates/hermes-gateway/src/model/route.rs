//! The route descriptor and the table that holds the merged, priority-sorted
//! set of routes the matcher reads.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Where a route originated from.
///
/// Local routes receive a configured priority boost and win ties against
/// remote routes of equal declared priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Remote,
    Local,
}

/// A route's forwarding target: either a fixed upstream URL or a service
/// identifier resolved through the registry to a set of instances.
///
/// Exactly one of these is set per `spec.md` §3's invariant; the YAML and
/// registry schemas express this as the mutually exclusive `target_url` /
/// `target_service_id` fields (see `config::local::LocalRoute`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Target {
    Direct(String),
    Service(String),
}

impl Target {
    /// The opaque key circuit breakers and balancers use to identify this
    /// target without holding a live instance handle (`spec.md` §9).
    pub fn key(&self) -> &str {
        match self {
            Target::Direct(url) => url,
            Target::Service(id) => id,
        }
    }
}

/// Authentication policy attached to a route.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub require_auth: bool,
    #[serde(default)]
    pub auth_service_id: Option<String>,
    #[serde(default)]
    pub public_paths: Vec<String>,
    #[serde(default)]
    pub login_redirect: Option<String>,
}

/// An immutable route descriptor, once installed in a `RouteTable`.
///
/// Construction is only possible through [`Route::new`], which enforces the
/// invariants `spec.md` §3 lists: the path pattern compiles, exactly one of
/// `direct_url`/`service_id` is set (guaranteed structurally by `Target`),
/// `public_paths` patterns compile, and `priority` fits in a 32-bit signed
/// integer (guaranteed structurally by using `i32`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub route_id: String,
    pub path_pattern: String,
    pub methods: Methods,
    pub priority: i32,
    pub target: Target,
    #[serde(default)]
    pub strip_prefix: bool,
    #[serde(default)]
    pub strip_path: Option<String>,
    #[serde(default)]
    pub auth_config: AuthConfig,
    pub source: Source,
    /// Opt-in for retrying non-idempotent methods (POST/PUT/PATCH/DELETE)
    /// on transport error or 502/503/504. `spec.md` §4.7 requires such an
    /// opt-in but the data model in §3 doesn't name the field; added here
    /// since the behavior can't otherwise be expressed per-route.
    #[serde(default)]
    pub retry_non_idempotent: bool,
}

/// The set of HTTP methods a route admits, or a wildcard admitting all.
///
/// Deserializes from either the literal string `"*"` or a list of method
/// names, matching the YAML schema in `spec.md` §6 — a plain `#[serde(untagged)]`
/// derive can't express the wildcard-string-vs-sequence split, so this is
/// hand-written.
#[derive(Debug, Clone, PartialEq)]
pub enum Methods {
    Any,
    Set(Vec<String>),
}

impl Methods {
    pub fn admits(&self, method: &str) -> bool {
        match self {
            Methods::Any => true,
            Methods::Set(methods) => methods.iter().any(|m| m.eq_ignore_ascii_case(method)),
        }
    }
}

impl Serialize for Methods {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Methods::Any => serializer.serialize_str("*"),
            Methods::Set(methods) => methods.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Methods {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Wildcard(String),
            List(Vec<String>),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Wildcard(s) if s == "*" => Ok(Methods::Any),
            Raw::Wildcard(other) => Err(de::Error::custom(format!(
                "expected \"*\" or a list of methods, got string {other:?}"
            ))),
            Raw::List(methods) => Ok(Methods::Set(methods)),
        }
    }
}

impl Route {
    /// Builds and validates a route. Returns an error describing the first
    /// invariant violation per `spec.md` §3.
    pub fn new(
        route_id: String,
        path_pattern: String,
        methods: Methods,
        priority: i32,
        target: Target,
        strip_prefix: bool,
        strip_path: Option<String>,
        auth_config: AuthConfig,
        source: Source,
        retry_non_idempotent: bool,
    ) -> Result<Self, String> {
        crate::matcher::pattern::compile(&path_pattern)
            .map_err(|e| format!("route {route_id}: invalid path_pattern: {e}"))?;
        for public_path in &auth_config.public_paths {
            crate::matcher::pattern::compile(public_path)
                .map_err(|e| format!("route {route_id}: invalid public_paths entry: {e}"))?;
        }
        Ok(Self {
            route_id,
            path_pattern,
            methods,
            priority,
            target,
            strip_prefix,
            strip_path,
            auth_config,
            source,
            retry_non_idempotent,
        })
    }

    /// True if `path` matches one of this route's `public_paths` patterns,
    /// meaning auth is bypassed regardless of whether the auth service is
    /// reachable (`spec.md` §9 Open Question, resolved conservatively).
    pub fn is_public_path(&self, path: &str) -> bool {
        self.auth_config
            .public_paths
            .iter()
            .any(|pattern| crate::matcher::pattern::compile(pattern).ok().map_or(false, |p| p.matches(path)))
    }
}

/// Counts the `*`/`**` segments in a path pattern. Lower is more specific:
/// an exact pattern (0 wildcard segments) outranks `/api/*`, which outranks
/// `/api/**`, at equal priority (`spec.md` §4.1: "Exact strings take
/// precedence over wildcards at equal priority").
fn wildcard_segment_count(path_pattern: &str) -> usize {
    path_pattern
        .split('/')
        .filter(|segment| *segment == "*" || *segment == "**")
        .count()
}

/// Ordering used to sort the installed route table: priority descending,
/// local before remote, exact-over-wildcard (fewer wildcard segments
/// first), then `route_id` ascending (`spec.md` §3, §4.1).
pub fn route_order(a: &Route, b: &Route) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| match (a.source, b.source) {
            (Source::Local, Source::Remote) => Ordering::Less,
            (Source::Remote, Source::Local) => Ordering::Greater,
            _ => Ordering::Equal,
        })
        .then_with(|| wildcard_segment_count(&a.path_pattern).cmp(&wildcard_segment_count(&b.path_pattern)))
        .then_with(|| a.route_id.cmp(&b.route_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(id: &str, priority: i32, source: Source) -> Route {
        route_with_pattern(id, "/api/**", priority, source)
    }

    fn route_with_pattern(id: &str, path_pattern: &str, priority: i32, source: Source) -> Route {
        Route::new(
            id.to_string(),
            path_pattern.to_string(),
            Methods::Any,
            priority,
            Target::Direct("http://x".to_string()),
            false,
            None,
            AuthConfig::default(),
            source,
            false,
        )
        .unwrap()
    }

    #[test]
    fn higher_priority_sorts_first() {
        let mut routes = vec![route("b", 10, Source::Remote), route("a", 100, Source::Remote)];
        routes.sort_by(route_order);
        assert_eq!(routes[0].route_id, "a");
    }

    #[test]
    fn equal_priority_local_wins_over_remote() {
        let mut routes = vec![route("remote", 1000, Source::Remote), route("local", 1000, Source::Local)];
        routes.sort_by(route_order);
        assert_eq!(routes[0].route_id, "local");
    }

    #[test]
    fn equal_priority_and_source_breaks_tie_by_id() {
        let mut routes = vec![route("zeta", 1, Source::Local), route("alpha", 1, Source::Local)];
        routes.sort_by(route_order);
        assert_eq!(routes[0].route_id, "alpha");
    }

    #[test]
    fn equal_priority_exact_pattern_wins_over_wildcard() {
        let mut routes = vec![
            route_with_pattern("a-wild", "/api/*", 1, Source::Local),
            route_with_pattern("z-exact", "/api/users", 1, Source::Local),
        ];
        routes.sort_by(route_order);
        assert_eq!(routes[0].route_id, "z-exact");
    }

    #[test]
    fn equal_priority_fewer_wildcard_segments_wins() {
        let mut routes = vec![
            route_with_pattern("catch_all", "/api/**", 1, Source::Local),
            route_with_pattern("one_wildcard", "/api/*", 1, Source::Local),
        ];
        routes.sort_by(route_order);
        assert_eq!(routes[0].route_id, "one_wildcard");
    }

    #[test]
    fn rejects_invalid_pattern() {
        let err = Route::new(
            "bad".to_string(),
            "/api/**/x".to_string(),
            Methods::Any,
            0,
            Target::Direct("http://x".to_string()),
            false,
            None,
            AuthConfig::default(),
            Source::Local,
            false,
        );
        assert!(err.is_err());
    }
}
