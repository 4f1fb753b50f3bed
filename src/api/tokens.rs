//! Token lifecycle endpoints.
//!
//! - POST `/refresh` - Exchange a refresh token for a new access token
//! - POST `/logout` - Blacklist the refresh token and clear both cookies
//! - POST `/token/verify` - Check a token without using it
//! - GET `/csrf` - Issue a CSRF cookie for cookie-mode clients

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::AuthState;
use super::error::{ApiError, ResultExt, parse_body};
use super::register::REQUIRED;
use crate::auth::{
    TOKEN_NOT_VALID, append_set_cookies, clear_cookie, generate_csrf_token, get_cookie, set_cookie,
};
use crate::jwt::{TokenType, format_timestamp};
use crate::settings::{CookieSettings, SameSite};

const LOGGED_OUT: &str = "Successfully logged out.";

const NOT_REVOKED_WARNING: &str = "Neither cookies or blacklist are enabled, so the token has not been deleted server side. Please make sure the token is deleted client side.";

#[derive(Deserialize, Default)]
struct RefreshRequest {
    refresh: Option<String>,
}

#[derive(Serialize)]
struct RefreshResponse {
    access: String,
    access_expiration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_expiration: Option<String>,
}

/// Refresh token from the body, falling back to the refresh cookie.
fn refresh_from_request<'a>(
    state: &AuthState,
    headers: &'a HeaderMap,
    body: &'a RefreshRequest,
) -> Option<&'a str> {
    if let Some(token) = body.refresh.as_deref().filter(|t| !t.is_empty()) {
        return Some(token);
    }
    state
        .settings
        .refresh_cookie
        .name()
        .and_then(|name| get_cookie(headers, name))
        .filter(|t| !t.is_empty())
}

/// Issue a new access token from a valid, non-blacklisted refresh token.
/// Optionally rotates the refresh token.
pub(super) async fn refresh(
    State(state): State<AuthState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let payload: RefreshRequest = parse_body(&body)?;
    let settings = &state.settings;

    let token = refresh_from_request(&state, &headers, &payload)
        .ok_or_else(|| ApiError::token_not_valid("No valid refresh token found."))?;

    let claims = state.jwt.validate_refresh_token(token).map_err(|e| {
        debug!(error = %e, "Refresh token rejected");
        ApiError::invalid_token()
    })?;

    if settings.blacklist_enabled
        && state
            .db
            .blacklist()
            .is_blacklisted(&claims.jti)
            .await
            .db_err("Failed to check blacklist")?
    {
        debug!(jti = %claims.jti, "Blacklisted refresh token presented");
        return Err(ApiError::invalid_token());
    }

    let user = state
        .db
        .users()
        .get_by_uuid(&claims.sub)
        .await
        .db_err("Failed to get user")?
        .filter(|user| user.is_active)
        .ok_or_else(|| {
            debug!(sub = %claims.sub, "Refresh for missing or inactive user");
            ApiError::invalid_token()
        })?;

    // Of concurrent refreshes with one token, only the request that inserts
    // the JTI may rotate it.
    if settings.rotate_refresh_tokens && settings.blacklist_enabled && settings.blacklist_after_rotation {
        let added = state
            .db
            .blacklist()
            .add(&claims.jti, &claims.sub, claims.exp)
            .await
            .db_err("Failed to blacklist rotated token")?;
        if !added {
            debug!(jti = %claims.jti, "Refresh token already spent by a concurrent rotation");
            return Err(ApiError::invalid_token());
        }
    }

    let access = state
        .jwt
        .generate_access_token(&user)
        .internal_err("Failed to generate access token")?;

    let rotated = if settings.rotate_refresh_tokens {
        Some(
            state
                .jwt
                .generate_refresh_token(&user)
                .internal_err("Failed to generate refresh token")?,
        )
    } else {
        None
    };

    let in_body = rotated.as_ref().filter(|_| !settings.refresh_cookie_only());
    let body = RefreshResponse {
        access: access.token.clone(),
        access_expiration: format_timestamp(access.expires_at),
        refresh: in_body.map(|r| r.token.clone()),
        refresh_expiration: in_body.map(|r| format_timestamp(r.expires_at)),
    };

    let mut response = (StatusCode::OK, Json(body)).into_response();
    append_set_cookies(
        response.headers_mut(),
        [
            set_cookie(&settings.access_cookie, &access.token, access.duration),
            rotated
                .as_ref()
                .and_then(|r| set_cookie(&settings.refresh_cookie, &r.token, r.duration)),
        ],
    );

    Ok(response)
}

/// Logout: blacklist the refresh token and clear both cookies.
///
/// Cookies are cleared on every outcome, including errors.
pub(super) async fn logout(State(state): State<AuthState>, headers: HeaderMap, body: Bytes) -> Response {
    let settings = &state.settings;
    let mut response = match revoke(&state, &headers, &body).await {
        Ok(detail) => (StatusCode::OK, Json(serde_json::json!({ "detail": detail }))).into_response(),
        Err(e) => e.into_response(),
    };

    append_set_cookies(
        response.headers_mut(),
        [
            clear_cookie(&settings.access_cookie),
            clear_cookie(&settings.refresh_cookie),
        ],
    );
    response
}

async fn revoke(state: &AuthState, headers: &HeaderMap, body: &Bytes) -> Result<&'static str, ApiError> {
    let settings = &state.settings;

    if !settings.blacklist_enabled {
        if settings.access_cookie.name.is_none() {
            return Ok(NOT_REVOKED_WARNING);
        }
        return Ok(LOGGED_OUT);
    }

    let token = if settings.refresh_cookie_only() {
        settings
            .refresh_cookie
            .name()
            .and_then(|name| get_cookie(headers, name))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    } else {
        let payload: RefreshRequest = parse_body(body)?;
        payload.refresh.filter(|t| !t.is_empty())
    };

    let Some(token) = token else {
        debug!("Logout without a refresh token");
        return Ok(LOGGED_OUT);
    };

    let claims = state.jwt.validate_refresh_token(&token).map_err(|e| {
        debug!(error = %e, "Logout with an unusable refresh token");
        ApiError::unauthorized(TOKEN_NOT_VALID)
    })?;

    let added = state
        .db
        .blacklist()
        .add(&claims.jti, &claims.sub, claims.exp)
        .await
        .db_err("Failed to blacklist token")?;

    if !added {
        return Err(ApiError::unauthorized("Token is blacklisted"));
    }

    info!(sub = %claims.sub, "User logged out");
    Ok(LOGGED_OUT)
}

#[derive(Deserialize, Default)]
struct VerifyRequest {
    token: Option<String>,
}

/// Verify a token of either type. Blacklisted refresh tokens do not verify.
pub(super) async fn verify(State(state): State<AuthState>, body: Bytes) -> Result<Response, ApiError> {
    let payload: VerifyRequest = parse_body(&body)?;
    let token = payload
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::field("token", REQUIRED))?;

    let claims = state.jwt.validate_any(&token).map_err(|e| {
        debug!(error = %e, "Token failed verification");
        ApiError::invalid_token()
    })?;

    if claims.token_type == TokenType::Refresh
        && state.settings.blacklist_enabled
        && state
            .db
            .blacklist()
            .is_blacklisted(&claims.jti)
            .await
            .db_err("Failed to check blacklist")?
    {
        return Err(ApiError::token_not_valid("Token is blacklisted"));
    }

    Ok((StatusCode::OK, Json(serde_json::json!({}))).into_response())
}

/// Issue a CSRF cookie readable by scripts, and echo the token.
pub(super) async fn csrf(State(state): State<AuthState>) -> Response {
    let token = generate_csrf_token();
    let access = &state.settings.access_cookie;

    // Shares domain and security attributes with the access cookie
    let cookie_settings = CookieSettings {
        name: Some(state.settings.csrf.cookie_name.clone()),
        domain: access.domain.clone(),
        path: "/".to_string(),
        secure: access.secure,
        http_only: false,
        same_site: SameSite::Lax,
    };

    let mut response =
        (StatusCode::OK, Json(serde_json::json!({ "csrf_token": token }))).into_response();
    append_set_cookies(
        response.headers_mut(),
        [set_cookie(&cookie_settings, &token, CSRF_COOKIE_AGE)],
    );
    response
}

/// One year.
const CSRF_COOKIE_AGE: u64 = 60 * 60 * 24 * 365;
