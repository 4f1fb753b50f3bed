//! Double-submit CSRF protection for cookie-carried tokens.
//!
//! A script reads the `csrftoken` cookie and echoes it in the `X-CSRFToken`
//! header. Cross-site requests carry the cookie but cannot read it, so the
//! header is missing or wrong.

use axum::http::{HeaderMap, Method, header};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

use super::cookie::get_cookie;
use crate::settings::CsrfSettings;

/// Size of a CSRF token before encoding.
const CSRF_TOKEN_BYTES: usize = 32;

/// Generate a fresh random CSRF token.
pub fn generate_csrf_token() -> String {
    let bytes: [u8; CSRF_TOKEN_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Run the double-submit check. Returns the failure reason on rejection.
pub fn check_csrf(method: &Method, headers: &HeaderMap, settings: &CsrfSettings) -> Result<(), String> {
    if is_safe_method(method) {
        return Ok(());
    }

    if !settings.trusted_origins.is_empty() {
        if let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
            let trusted = settings
                .trusted_origins
                .iter()
                .any(|t| t.trim_end_matches('/').eq_ignore_ascii_case(origin.trim_end_matches('/')));
            if !trusted {
                return Err(format!(
                    "Origin checking failed - {} does not match any trusted origins.",
                    origin
                ));
            }
        }
    }

    let cookie_token = match get_cookie(headers, &settings.cookie_name) {
        Some(token) if !token.is_empty() => token,
        _ => return Err("CSRF cookie not set.".to_string()),
    };

    let header_token = match headers
        .get(settings.header_name.as_str())
        .and_then(|v| v.to_str().ok())
    {
        Some(token) if !token.is_empty() => token,
        _ => return Err("CSRF token missing.".to_string()),
    };

    if !constant_time_eq(cookie_token.as_bytes(), header_token.as_bytes()) {
        return Err("CSRF token incorrect.".to_string());
    }

    Ok(())
}

fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
