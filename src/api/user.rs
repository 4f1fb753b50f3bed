//! Details of the authenticated user.
//!
//! - GET `/user` - Read the profile
//! - PUT `/user` - Replace the editable fields (`username` required)
//! - PATCH `/user` - Update some of the editable fields
//!
//! The e-mail address is read-only here.

use axum::{Json, body::Bytes, extract::State, response::IntoResponse};
use serde::Deserialize;
use tracing::info;

use super::AuthState;
use super::error::{ApiError, ErrorCollector, ResultExt, parse_body};
use super::register::{USERNAME_TAKEN, required, username_errors};
use super::session::UserDetails;
use crate::auth::Auth;
use crate::db::unique_violation;

/// Longest accepted first or last name.
const MAX_NAME_LENGTH: usize = 150;

#[derive(Deserialize, Default)]
struct UpdateUserRequest {
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

pub(super) async fn get_user(Auth(auth): Auth) -> impl IntoResponse {
    Json(UserDetails::from(&auth.user))
}

pub(super) async fn put_user(
    State(state): State<AuthState>,
    Auth(auth): Auth,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    update_user(state, auth.user, body, false).await
}

pub(super) async fn patch_user(
    State(state): State<AuthState>,
    Auth(auth): Auth,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    update_user(state, auth.user, body, true).await
}

fn check_name(errors: &mut ErrorCollector, field: &str, value: &str) {
    if value.chars().count() > MAX_NAME_LENGTH {
        errors.add(
            field,
            format!(
                "Ensure this field has no more than {} characters.",
                MAX_NAME_LENGTH
            ),
        );
    }
}

async fn update_user(
    state: AuthState,
    mut user: crate::db::User,
    body: Bytes,
    partial: bool,
) -> Result<Json<UserDetails>, ApiError> {
    let payload: UpdateUserRequest = parse_body(&body)?;
    let mut errors = ErrorCollector::default();

    let username = if partial && payload.username.is_none() {
        None
    } else {
        required(&mut errors, "username", &payload.username, true)
    };

    if let Some(username) = username {
        let format_errors = username_errors(username);
        if format_errors.is_empty()
            && state
                .db
                .users()
                .is_username_taken(username, Some(user.id))
                .await
                .db_err("Failed to check username")?
        {
            errors.add("username", USERNAME_TAKEN);
        }
        for msg in format_errors {
            errors.add("username", msg);
        }
    }

    let first_name = payload.first_name.as_deref().map(str::trim);
    let last_name = payload.last_name.as_deref().map(str::trim);
    if let Some(first_name) = first_name {
        check_name(&mut errors, "first_name", first_name);
    }
    if let Some(last_name) = last_name {
        check_name(&mut errors, "last_name", last_name);
    }

    errors.into_result()?;

    if let Some(username) = username {
        user.username = username.to_string();
    }
    if let Some(first_name) = first_name {
        user.first_name = first_name.to_string();
    }
    if let Some(last_name) = last_name {
        user.last_name = last_name.to_string();
    }

    let updated = state
        .db
        .users()
        .update_profile(user.id, &user.username, &user.first_name, &user.last_name)
        .await;
    if let Err(e) = updated {
        return Err(match unique_violation(&e) {
            Some("username") => ApiError::field("username", USERNAME_TAKEN),
            _ => ApiError::db_error("Failed to update user", e),
        });
    }

    info!(user_id = user.id, "User profile updated");

    Ok(Json(UserDetails::from(&user)))
}
