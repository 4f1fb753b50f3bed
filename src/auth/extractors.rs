//! Axum extractors for authentication.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use tracing::debug;

use super::cookie::get_cookie;
use super::csrf::check_csrf;
use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use super::types::{AuthenticatedUser, TokenSource};
use crate::settings::AuthSettings;

/// Read the raw token from the `Authorization` header.
///
/// A header whose type is not one of the accepted types is ignored. A header
/// with an accepted type must contain exactly two space-delimited values.
fn header_token<'a>(
    headers: &'a HeaderMap,
    header_types: &[String],
) -> Result<Option<&'a str>, AuthErrorKind> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let Ok(value) = value.to_str() else {
        return Ok(None);
    };

    let parts: Vec<&str> = value.split_whitespace().collect();
    let Some(scheme) = parts.first() else {
        return Ok(None);
    };
    if !header_types.iter().any(|t| t == scheme) {
        return Ok(None);
    }
    if parts.len() != 2 {
        return Err(AuthErrorKind::BadAuthorizationHeader);
    }

    Ok(Some(parts[1]))
}

/// Pick the candidate access token: the header wins over the cookie.
///
/// The cookie is only read when no `Authorization` header is sent at all. A
/// header of an unaccepted type leaves the request anonymous.
fn resolve_token<'a>(
    headers: &'a HeaderMap,
    settings: &AuthSettings,
) -> Result<Option<(&'a str, TokenSource)>, AuthErrorKind> {
    if headers.contains_key(header::AUTHORIZATION) {
        let token = header_token(headers, &settings.auth_header_types)?;
        return Ok(token.map(|token| (token, TokenSource::Header)));
    }

    let cookie = settings
        .access_cookie
        .name()
        .and_then(|name| get_cookie(headers, name))
        .filter(|token| !token.is_empty());

    Ok(cookie.map(|token| (token, TokenSource::Cookie)))
}

/// Core authentication logic shared by the extractors.
///
/// Returns `Ok(None)` when no credentials were supplied. Supplied but
/// unusable credentials are always an error.
pub(crate) async fn authenticate_request<S>(
    parts: &Parts,
    state: &S,
) -> Result<Option<AuthenticatedUser>, AuthErrorKind>
where
    S: HasAuthBackend + Send + Sync,
{
    let settings = state.settings();
    let candidate = resolve_token(&parts.headers, settings)?;

    let csrf = &settings.csrf;
    let cookie_mode = settings.access_cookie.name.is_some();
    let needs_csrf = match candidate {
        Some((_, TokenSource::Cookie)) => csrf.enabled,
        Some((_, TokenSource::Header)) => false,
        None => {
            csrf.enabled
                && csrf.enforce_on_unauthenticated
                && cookie_mode
                && !parts.headers.contains_key(header::AUTHORIZATION)
        }
    };
    if needs_csrf {
        check_csrf(&parts.method, &parts.headers, csrf).map_err(|reason| {
            debug!(reason = %reason, "CSRF check failed");
            AuthErrorKind::Csrf(reason)
        })?;
    }

    let Some((token, source)) = candidate else {
        return Ok(None);
    };

    let claims = state.jwt().validate_access_token(token).map_err(|e| {
        debug!(error = %e, ?source, "Access token rejected");
        AuthErrorKind::InvalidToken
    })?;

    let user = state
        .db()
        .users()
        .get_by_uuid(&claims.sub)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get user: {}", e);
            AuthErrorKind::DatabaseError
        })?
        .ok_or_else(|| {
            debug!(sub = %claims.sub, "Token subject not found");
            AuthErrorKind::UserNotFound
        })?;

    if !user.is_active {
        debug!(sub = %claims.sub, "Token subject is inactive");
        return Err(AuthErrorKind::UserInactive);
    }

    Ok(Some(AuthenticatedUser {
        user,
        claims,
        source,
    }))
}

/// Extractor for endpoints that require authentication.
/// Accepts the `Authorization` header or the access cookie.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match authenticate_request(parts, state).await? {
            Some(user) => Ok(Auth(user)),
            None => Err(AuthErrorKind::NotAuthenticated.into()),
        }
    }
}
