mod error;
mod login;
mod register;
mod session;
mod tokens;
mod user;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;

use crate::db::Database;
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::rate_limit::{RateLimitConfig, rate_limit_auth};
use crate::settings::AuthSettings;

pub use error::{ApiError, FieldErrors, NON_FIELD_ERRORS};
pub use session::UserDetails;

/// State shared by every auth endpoint.
#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub settings: Arc<AuthSettings>,
}

impl_has_auth_backend!(AuthState);

/// Create the auth API router, meant to be nested under `/api/v1/auth`.
///
/// Register, login and logout share the per-IP rate limit when one is configured.
pub fn create_api_router(
    state: AuthState,
    rate_limit: Option<Arc<RateLimitConfig>>,
    no_signup: bool,
) -> Router {
    let mut limited = Router::new()
        .route("/login", post(login::login))
        .route("/logout", post(tokens::logout));
    if !no_signup {
        limited = limited.route("/register", post(register::register));
    }
    let mut limited = limited.with_state(state.clone());
    if let Some(config) = rate_limit {
        limited = limited.layer(middleware::from_fn_with_state(config, rate_limit_auth));
    }

    let open = Router::new()
        .route("/refresh", post(tokens::refresh))
        .route("/token/verify", post(tokens::verify))
        .route("/csrf", get(tokens::csrf))
        .route(
            "/user",
            get(user::get_user).put(user::put_user).patch(user::patch_user),
        )
        .with_state(state);

    Router::new().merge(limited).merge(open)
}
