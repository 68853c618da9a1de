//! Path rewriting before forwarding: `strip_prefix` removes either the
//! route's explicit `strip_path` or the literal (non-wildcard) prefix of
//! `path_pattern`.
//!
//! Grounded on `kairos-rs::utils::path::format_route`'s string-construction
//! style (plain `format!`, no templating library); the prefix-computation
//! itself is new since the teacher rewrites paths via `{param}` capture
//! substitution rather than prefix stripping.

use crate::model::route::Route;

/// The literal, non-wildcard prefix of a path pattern: everything up to
/// (not including) the first `*` or `**` segment, with the trailing slash
/// removed. `"/auth/**"` → `"/auth"`; `"/api/*/items"` → `"/api"`.
fn literal_prefix(path_pattern: &str) -> String {
    let mut prefix = String::new();
    for segment in path_pattern.split('/') {
        if segment == "*" || segment == "**" {
            break;
        }
        if !prefix.is_empty() || !segment.is_empty() {
            prefix.push('/');
            prefix.push_str(segment);
        }
    }
    if prefix.is_empty() {
        "/".to_string()
    } else {
        prefix
    }
}

/// Computes the path forwarded upstream for `route` given the inbound
/// `path` (no query string). Returns `path` unchanged unless
/// `route.strip_prefix` is set.
pub fn rewrite(route: &Route, path: &str) -> String {
    if !route.strip_prefix {
        return path.to_string();
    }
    let prefix = route
        .strip_path
        .clone()
        .unwrap_or_else(|| literal_prefix(&route.path_pattern));

    let stripped = path.strip_prefix(prefix.as_str()).unwrap_or(path);
    if stripped.is_empty() {
        "/".to_string()
    } else if stripped.starts_with('/') {
        stripped.to_string()
    } else {
        format!("/{stripped}")
    }
}
