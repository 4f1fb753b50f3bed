//! Account registration.
//!
//! - POST `/register` - Create an account and, unless e-mail verification is
//!   mandatory, log it in straight away

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::info;

use super::AuthState;
use super::error::{ApiError, ErrorCollector, NON_FIELD_ERRORS, ResultExt, parse_body};
use super::session::issue_session;
use crate::db::{NewUser, unique_violation};
use crate::password::{hash_password, validate_password};

/// Longest accepted username.
pub const MAX_USERNAME_LENGTH: usize = 150;

pub(super) const REQUIRED: &str = "This field is required.";
pub(super) const BLANK: &str = "This field may not be blank.";
pub(super) const USERNAME_TAKEN: &str = "A user with that username already exists.";
const EMAIL_TAKEN: &str = "A user with that email already exists.";

#[derive(Deserialize, Default)]
struct RegisterRequest {
    username: Option<String>,
    email: Option<String>,
    password1: Option<String>,
    password2: Option<String>,
}

/// Format checks for a username. Uniqueness is checked by the caller.
pub(super) fn username_errors(username: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if username.chars().count() > MAX_USERNAME_LENGTH {
        errors.push(format!(
            "Ensure this field has no more than {} characters.",
            MAX_USERNAME_LENGTH
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        errors.push(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
                .to_string(),
        );
    }
    errors
}

fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !local.contains('@')
        && domain.contains('.')
        && domain
            .split('.')
            .all(|label| !label.is_empty() && !label.starts_with('-') && !label.ends_with('-'))
}

/// Take a required text field, recording "required"/"blank" errors.
pub(super) fn required<'a>(
    errors: &mut ErrorCollector,
    field: &str,
    value: &'a Option<String>,
    trim: bool,
) -> Option<&'a str> {
    match value.as_deref() {
        None => {
            errors.add(field, REQUIRED);
            None
        }
        Some(v) if v.trim().is_empty() => {
            errors.add(field, BLANK);
            None
        }
        Some(v) => Some(if trim { v.trim() } else { v }),
    }
}

pub(super) async fn register(State(state): State<AuthState>, body: Bytes) -> Result<Response, ApiError> {
    let payload: RegisterRequest = parse_body(&body)?;
    let mut errors = ErrorCollector::default();

    let username = required(&mut errors, "username", &payload.username, true);
    let email = required(&mut errors, "email", &payload.email, true);
    let password1 = required(&mut errors, "password1", &payload.password1, false);
    let password2 = required(&mut errors, "password2", &payload.password2, false);

    if let Some(username) = username {
        let format_errors = username_errors(username);
        if format_errors.is_empty() {
            let taken = state
                .db
                .users()
                .is_username_taken(username, None)
                .await
                .db_err("Failed to check username")?;
            if taken {
                errors.add("username", USERNAME_TAKEN);
            }
        }
        for msg in format_errors {
            errors.add("username", msg);
        }
    }

    if let Some(email) = email {
        if !is_valid_email(email) {
            errors.add("email", "Enter a valid email address.");
        } else if state
            .db
            .users()
            .is_email_taken(email)
            .await
            .db_err("Failed to check email")?
        {
            errors.add("email", EMAIL_TAKEN);
        }
    }

    if let Some(password1) = password1 {
        for msg in validate_password(password1, username) {
            errors.add("password1", msg);
        }
    }

    if let (Some(password1), Some(password2)) = (password1, password2) {
        if password1 != password2 {
            errors.add(NON_FIELD_ERRORS, "The two password fields didn't match.");
        }
    }

    errors.into_result()?;

    // All three are Some once validation passed
    let (Some(username), Some(email), Some(password)) = (username, email, password1) else {
        return Err(ApiError::internal());
    };

    let password_hash = hash_password(password).internal_err("Failed to hash password")?;
    let uuid = uuid::Uuid::new_v4().to_string();

    let created = state
        .db
        .users()
        .create(NewUser {
            uuid: &uuid,
            username,
            email,
            password_hash: &password_hash,
            is_staff: false,
        })
        .await;

    // A concurrent registration can take the name between check and insert
    let id = match created {
        Ok(id) => id,
        Err(e) => {
            return Err(match unique_violation(&e) {
                Some("username") => ApiError::field("username", USERNAME_TAKEN),
                Some("email") => ApiError::field("email", EMAIL_TAKEN),
                _ => ApiError::db_error("Failed to create user", e),
            });
        }
    };

    info!(user_id = id, username = %username, "User registered");

    if state.settings.email_verification.is_mandatory() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let user = state
        .db
        .users()
        .get_by_id(id)
        .await
        .db_err("Failed to load new user")?
        .ok_or_else(ApiError::internal)?;

    issue_session(&state, &user, StatusCode::CREATED)
}
