//! Rollout cookie extraction.

use axum::http::{header::COOKIE, HeaderMap};

/// Cookie carrying the stable per-client rollout identifier.
pub const ROLLOUT_COOKIE_NAME: &str = "canary-rollout";

/// Find the value of cookie `name` across all `Cookie` headers.
///
/// Surrounding double quotes are stripped. Returns `None` when the cookie is
/// absent or a header is not valid UTF-8.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| unquote(value.trim()))
}

/// The rollout identifier of a request, if it carries one.
pub fn rollout_identifier(headers: &HeaderMap) -> Option<&str> {
    cookie_value(headers, ROLLOUT_COOKIE_NAME)
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
