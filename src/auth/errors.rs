//! Authentication error types.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Value of `WWW-Authenticate` on every 401 response.
pub const WWW_AUTHENTICATE: &str = "Bearer realm=\"api\"";

/// Detail returned for every rejected token, whatever the concrete reason.
pub const TOKEN_NOT_VALID: &str = "Token is invalid or expired";

/// Internal auth error kind used by the core authentication logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorKind {
    NotAuthenticated,
    /// Recognised header type without exactly one token part
    BadAuthorizationHeader,
    InvalidToken,
    UserNotFound,
    UserInactive,
    /// Double-submit check failed, with the reason
    Csrf(String),
    DatabaseError,
}

/// API authentication errors, rendered as DRF-style JSON.
#[derive(Debug)]
pub struct ApiAuthError {
    pub(super) kind: AuthErrorKind,
}

impl ApiAuthError {
    fn status_code(&self) -> StatusCode {
        match self.kind {
            AuthErrorKind::NotAuthenticated
            | AuthErrorKind::BadAuthorizationHeader
            | AuthErrorKind::InvalidToken
            | AuthErrorKind::UserNotFound
            | AuthErrorKind::UserInactive => StatusCode::UNAUTHORIZED,
            AuthErrorKind::Csrf(_) => StatusCode::FORBIDDEN,
            AuthErrorKind::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match &self.kind {
            AuthErrorKind::NotAuthenticated => {
                "Authentication credentials were not provided.".to_string()
            }
            AuthErrorKind::BadAuthorizationHeader => {
                "Authorization header must contain two space-delimited values".to_string()
            }
            AuthErrorKind::InvalidToken
            | AuthErrorKind::UserNotFound
            | AuthErrorKind::UserInactive => TOKEN_NOT_VALID.to_string(),
            AuthErrorKind::Csrf(reason) => format!("CSRF Failed: {}", reason),
            AuthErrorKind::DatabaseError => "A server error occurred.".to_string(),
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self.kind {
            AuthErrorKind::BadAuthorizationHeader => Some("bad_authorization_header"),
            AuthErrorKind::InvalidToken
            | AuthErrorKind::UserNotFound
            | AuthErrorKind::UserInactive => Some("token_not_valid"),
            _ => None,
        }
    }
}

impl From<AuthErrorKind> for ApiAuthError {
    fn from(kind: AuthErrorKind) -> Self {
        Self { kind }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (
            status,
            Json(ErrorResponse {
                detail: self.detail(),
                code: self.code(),
            }),
        )
            .into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(WWW_AUTHENTICATE),
            );
        }

        response
    }
}
