//! Shared error handling for API endpoints.

use std::collections::BTreeMap;

use axum::{
    Json,
    body::Bytes,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::error;

use crate::auth::{TOKEN_NOT_VALID, WWW_AUTHENTICATE};

/// Key for errors that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Field name to messages, serialized as `{"field": ["msg", ...]}`.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Extension trait for concise error mapping on Results.
pub trait ResultExt<T> {
    fn db_err(self, msg: &str) -> Result<T, ApiError>;
    fn internal_err(self, msg: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn db_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::db_error(msg, e))
    }
    fn internal_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| {
            error!("{}: {}", msg, e);
            ApiError::internal()
        })
    }
}

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Validation(FieldErrors),
    Unauthorized {
        detail: String,
        code: Option<&'static str>,
    },
    Internal,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn validation(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }

    /// A single error for one field.
    pub fn field(field: &str, msg: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![msg.into()]);
        Self::Validation(errors)
    }

    /// A single error under `non_field_errors`.
    pub fn non_field(msg: impl Into<String>) -> Self {
        Self::field(NON_FIELD_ERRORS, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized {
            detail: msg.into(),
            code: None,
        }
    }

    /// 401 for a refresh token that failed any check.
    pub fn token_not_valid(msg: impl Into<String>) -> Self {
        Self::Unauthorized {
            detail: msg.into(),
            code: Some("token_not_valid"),
        }
    }

    /// The generic [`TOKEN_NOT_VALID`] rejection.
    pub fn invalid_token() -> Self {
        Self::token_not_valid(TOKEN_NOT_VALID)
    }

    pub fn internal() -> Self {
        Self::Internal
    }

    pub fn db_error(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail, code) = match self {
            ApiError::Validation(errors) => {
                return (StatusCode::BAD_REQUEST, Json(errors)).into_response();
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Unauthorized { detail, code } => (StatusCode::UNAUTHORIZED, detail, code),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "A server error occurred.".to_string(),
                None,
            ),
        };

        let mut response = (status, Json(ErrorResponse { detail, code })).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(WWW_AUTHENTICATE),
            );
        }
        response
    }
}

/// Parse a JSON request body. An empty body yields `T::default()`.
pub fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("JSON parse error - {}", e)))
}

/// Collects validation messages field by field.
#[derive(Default)]
pub struct ErrorCollector {
    errors: FieldErrors,
}

impl ErrorCollector {
    pub fn add(&mut self, field: &str, msg: impl Into<String>) {
        self.errors.entry(field.to_string()).or_default().push(msg.into());
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation(self.errors))
        }
    }
}
