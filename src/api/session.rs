//! Token issuance shared by login and registration.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::AuthState;
use super::error::{ApiError, ResultExt};
use crate::auth::{append_set_cookies, set_cookie};
use crate::db::User;
use crate::jwt::format_timestamp;

/// Public view of a user. `pk` is the public UUID, never the row id.
#[derive(Serialize)]
pub struct UserDetails {
    pub pk: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&User> for UserDetails {
    fn from(user: &User) -> Self {
        Self {
            pk: user.uuid.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

#[derive(Serialize)]
struct SessionResponse {
    user: UserDetails,
    access: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_expiration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_expiration: Option<String>,
}

/// Mint a token pair for `user`, set both cookies and return the session body.
///
/// The refresh token is left out of the body when it lives in an httponly cookie.
pub fn issue_session(state: &AuthState, user: &User, status: StatusCode) -> Result<Response, ApiError> {
    let pair = state
        .jwt
        .generate_pair(user)
        .internal_err("Failed to generate tokens")?;
    let settings = &state.settings;

    let (access_expiration, refresh_expiration) = if settings.return_expiration {
        (
            Some(format_timestamp(pair.access.expires_at)),
            Some(format_timestamp(pair.refresh.expires_at)),
        )
    } else {
        (None, None)
    };

    let body = SessionResponse {
        user: UserDetails::from(user),
        access: pair.access.token.clone(),
        refresh: (!settings.refresh_cookie_only()).then(|| pair.refresh.token.clone()),
        access_expiration,
        refresh_expiration,
    };

    let mut response = (status, Json(body)).into_response();
    append_set_cookies(
        response.headers_mut(),
        [
            set_cookie(&settings.access_cookie, &pair.access.token, pair.access.duration),
            set_cookie(&settings.refresh_cookie, &pair.refresh.token, pair.refresh.duration),
        ],
    );

    Ok(response)
}
