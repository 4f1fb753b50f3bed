//! Password login.
//!
//! - POST `/login` - Exchange credentials for an access/refresh pair

use axum::{body::Bytes, extract::State, http::StatusCode, response::Response};
use serde::Deserialize;
use tracing::{debug, info};

use super::AuthState;
use super::error::{ApiError, ResultExt, parse_body};
use super::register::REQUIRED;
use super::session::issue_session;
use crate::password::verify_password;

const BAD_CREDENTIALS: &str = "Unable to log in with provided credentials.";

#[derive(Deserialize, Default)]
struct LoginRequest {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub(super) async fn login(State(state): State<AuthState>, body: Bytes) -> Result<Response, ApiError> {
    let payload: LoginRequest = parse_body(&body)?;

    let Some(password) = payload.password.as_deref().filter(|p| !p.is_empty()) else {
        return Err(ApiError::field("password", REQUIRED));
    };

    // An e-mail address is resolved to its account first, falling back to
    // the submitted username when no account has that address
    let users = state.db.users();
    let mut user = None;
    if let Some(email) = non_blank(&payload.email) {
        user = users.get_by_email(email).await.db_err("Failed to get user")?;
    }
    if user.is_none() {
        if let Some(username) = non_blank(&payload.username) {
            user = users
                .get_by_username(username)
                .await
                .db_err("Failed to get user")?;
        }
    }

    let Some(user) = user else {
        debug!("Login for unknown account");
        return Err(ApiError::non_field(BAD_CREDENTIALS));
    };

    if !verify_password(password, &user.password_hash).internal_err("Failed to verify password")? {
        debug!(user_id = user.id, "Login with wrong password");
        return Err(ApiError::non_field(BAD_CREDENTIALS));
    }

    if !user.is_active {
        return Err(ApiError::non_field("User account is disabled."));
    }

    if state.settings.email_verification.is_mandatory() && !user.email_verified {
        return Err(ApiError::non_field("E-mail is not verified."));
    }

    info!(user_id = user.id, username = %user.username, "User logged in");

    issue_session(&state, &user, StatusCode::OK)
}
