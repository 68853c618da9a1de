//! Header translation between the inbound request and the forwarded
//! upstream call: hop-by-hop stripping, `X-Forwarded-*`, `X-Request-ID`.
//!
//! Grounded on `kairos-rs::services::http::RouteHandler::build_headers_optimized`,
//! whose `SKIP_HEADERS` prefix list (`host`, `connection`, `upgrade`,
//! `proxy-connection`) is widened here to the exact RFC 7230 hop-by-hop set
//! `spec.md` §4.7 names.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(&name) || name == "host"
}

/// Builds the header set sent upstream: the inbound headers with
/// hop-by-hop headers and `Host` dropped, `X-Forwarded-For` appended (or
/// created), `X-Forwarded-Proto`/`X-Forwarded-Host` set, and
/// `X-Request-ID` injected if the client didn't send one.
pub fn build_upstream_headers(
    inbound: &[(String, String)],
    client_ip: &str,
    forwarded_proto: &str,
    forwarded_host: &str,
    request_id: &str,
) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 4);
    let mut existing_xff: Option<String> = None;
    let mut has_request_id = false;

    for (name, value) in inbound {
        let lower = name.to_ascii_lowercase();
        if is_hop_by_hop(&lower) {
            continue;
        }
        if lower == "x-forwarded-for" {
            existing_xff = Some(value.clone());
            continue;
        }
        if lower == "x-request-id" {
            has_request_id = true;
        }
        if let (Ok(header_name), Ok(header_value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(header_name, header_value);
        }
    }

    let xff = match existing_xff {
        Some(existing) => format!("{existing}, {client_ip}"),
        None => client_ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&xff) {
        headers.insert(HeaderName::from_static("x-forwarded-for"), value);
    }
    if let Ok(value) = HeaderValue::from_str(forwarded_proto) {
        headers.insert(HeaderName::from_static("x-forwarded-proto"), value);
    }
    if let Ok(value) = HeaderValue::from_str(forwarded_host) {
        headers.insert(HeaderName::from_static("x-forwarded-host"), value);
    }
    if !has_request_id {
        if let Ok(value) = HeaderValue::from_str(request_id) {
            headers.insert(HeaderName::from_static("x-request-id"), value);
        }
    }

    headers
}
