//! Cookie helpers
//!
//! The browser carries a single OAuth cookie: the binding cookie, which
//! echoes the `state` this browser initiated so the callback can tell a
//! legitimate return from a forged one.

use axum::http::{header, HeaderMap};

use crate::config::SecuritySettings;

/// Name of the binding cookie
pub const BINDING_COOKIE: &str = "centrinote_oauth_state";

/// Path the binding cookie is scoped to
pub const BINDING_COOKIE_PATH: &str = "/oauth";

/// Read a cookie value from request headers
#[must_use]
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value binding this browser to `state`
#[must_use]
pub fn binding_cookie(state: &str, security: &SecuritySettings) -> String {
    let mut cookie = format!(
        "{BINDING_COOKIE}={state}; Path={BINDING_COOKIE_PATH}; Max-Age={}; HttpOnly; SameSite={}",
        security.handshake_ttl_secs,
        security.same_site.as_str(),
    );
    if security.secure_cookies {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value removing the binding cookie
#[must_use]
pub fn clear_binding_cookie(security: &SecuritySettings) -> String {
    let mut cookie = format!(
        "{BINDING_COOKIE}=; Path={BINDING_COOKIE_PATH}; Max-Age=0; HttpOnly; SameSite={}",
        security.same_site.as_str(),
    );
    if security.secure_cookies {
        cookie.push_str("; Secure");
    }
    cookie
}
