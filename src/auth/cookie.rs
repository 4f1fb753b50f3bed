//! Cookie parsing and `Set-Cookie` construction for token cookies.

use axum::http::{HeaderMap, HeaderValue, header};

use crate::settings::CookieSettings;

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Build a `Set-Cookie` value carrying `value` for `max_age` seconds.
/// Returns None when the cookie is disabled.
pub fn set_cookie(settings: &CookieSettings, value: &str, max_age: u64) -> Option<String> {
    let name = settings.name()?;
    Some(format!(
        "{}={}; {}Max-Age={}",
        name,
        value,
        attributes(settings),
        max_age
    ))
}

/// Build a `Set-Cookie` value that removes the cookie. Path and domain must
/// match the ones used when setting it.
pub fn clear_cookie(settings: &CookieSettings) -> Option<String> {
    let name = settings.name()?;
    Some(format!(
        "{}=; {}Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
        name,
        attributes(settings)
    ))
}

fn attributes(settings: &CookieSettings) -> String {
    let mut attrs = format!("Path={}; ", settings.path);
    if let Some(domain) = &settings.domain {
        attrs.push_str(&format!("Domain={}; ", domain));
    }
    if settings.http_only {
        attrs.push_str("HttpOnly; ");
    }
    if settings.secure {
        attrs.push_str("Secure; ");
    }
    attrs.push_str(&format!("SameSite={}; ", settings.same_site.as_str()));
    attrs
}

/// Append `Set-Cookie` headers, skipping disabled cookies.
pub fn append_set_cookies(headers: &mut HeaderMap, cookies: impl IntoIterator<Item = Option<String>>) {
    for cookie in cookies.into_iter().flatten() {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!(error = %e, "Invalid Set-Cookie value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SameSite;

    #[test]
    fn test_get_cookie_simple() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("access_token=abc123"),
        );

        assert_eq!(get_cookie(&headers, "access_token"), Some("abc123"));
    }

    #[test]
    fn test_get_cookie_multiple() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("foo=bar; access_token=abc123; refresh_token=xyz789"),
        );

        assert_eq!(get_cookie(&headers, "access_token"), Some("abc123"));
        assert_eq!(get_cookie(&headers, "refresh_token"), Some("xyz789"));
        assert_eq!(get_cookie(&headers, "foo"), Some("bar"));
    }

    #[test]
    fn test_get_cookie_not_found() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("foo=bar"));
        assert_eq!(get_cookie(&headers, "access_token"), None);

        let headers = HeaderMap::new();
        assert_eq!(get_cookie(&headers, "access_token"), None);
    }

    #[test]
    fn test_set_cookie_attributes() {
        let settings = CookieSettings {
            name: Some("refresh_token".to_string()),
            domain: Some("example.com".to_string()),
            path: "/api/v1/auth".to_string(),
            secure: true,
            http_only: true,
            same_site: SameSite::Strict,
        };

        let cookie = set_cookie(&settings, "tok", 86400).unwrap();
        assert_eq!(
            cookie,
            "refresh_token=tok; Path=/api/v1/auth; Domain=example.com; HttpOnly; Secure; SameSite=Strict; Max-Age=86400"
        );
    }

    #[test]
    fn test_set_cookie_without_optional_flags() {
        let settings = CookieSettings {
            http_only: false,
            ..CookieSettings::new("access_token")
        };

        let cookie = set_cookie(&settings, "tok", 300).unwrap();
        assert_eq!(cookie, "access_token=tok; Path=/; SameSite=Lax; Max-Age=300");
    }

    #[test]
    fn test_clear_cookie() {
        let cookie = clear_cookie(&CookieSettings::new("access_token")).unwrap();
        assert!(cookie.starts_with("access_token=; "));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn test_disabled_cookie_produces_nothing() {
        let settings = CookieSettings::disabled();
        assert!(set_cookie(&settings, "tok", 300).is_none());
        assert!(clear_cookie(&settings).is_none());
    }
}
