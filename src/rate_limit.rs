//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down credential
//! stuffing. Register, login and logout share one bucket per IP.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderName, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::warn;

use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    pub auth: Arc<IpLimiter>,
    /// Header carrying the client IP when running behind a proxy
    pub ip_header: Option<HeaderName>,
}

impl RateLimitConfig {
    /// Allow `per_minute` auth requests per IP. Returns None (no limiting) for 0.
    pub fn per_minute(per_minute: u32, ip_header: Option<HeaderName>) -> Option<Self> {
        let rate = NonZeroU32::new(per_minute)?;
        Some(Self {
            auth: Arc::new(RateLimiter::keyed(Quota::per_minute(rate))),
            ip_header,
        })
    }
}

/// Middleware for rate limiting the authentication endpoints.
pub async fn rate_limit_auth(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = match extract_client_ip(&request, config.ip_header.as_ref()) {
        Ok(ip) => ip,
        Err(reason) => {
            warn!(reason, "Rejecting request without a client IP");
            return (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "detail": "Unable to determine client IP." })),
            )
                .into_response();
        }
    };

    match config.auth.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, "Auth rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "detail": "Request was throttled. Please try again later."
                })),
            )
                .into_response()
        }
    }
}
