pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod password;
pub mod rate_limit;
pub mod settings;

use api::{AuthState, create_api_router};
use axum::{Router, http::HeaderName};
use db::Database;
use jwt::{ClaimsProvider, JwtConfig};
use rate_limit::RateLimitConfig;
use settings::AuthSettings;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Path prefix of the authentication API.
pub const AUTH_API_PATH: &str = "/api/v1/auth";

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// HS256 secret for signing tokens
    pub jwt_secret: Vec<u8>,
    pub settings: AuthSettings,
    /// Custom claims added to every issued token
    pub claims: Arc<dyn ClaimsProvider>,
    /// Auth requests allowed per IP and minute; 0 disables rate limiting
    pub rate_limit: u32,
    /// Header carrying the client IP (requires running behind a proxy)
    pub ip_header: Option<HeaderName>,
    /// Whether new user signups are disabled
    pub no_signup: bool,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(
        JwtConfig::new(&config.jwt_secret, &config.settings).with_claims(config.claims.clone()),
    );

    let state = AuthState {
        db: config.db.clone(),
        jwt,
        settings: Arc::new(config.settings.clone()),
    };

    let rate_limit =
        RateLimitConfig::per_minute(config.rate_limit, config.ip_header.clone()).map(Arc::new);
    if rate_limit.is_none() {
        info!("Auth rate limiting disabled");
    }

    Router::new().nest(
        AUTH_API_PATH,
        create_api_router(state, rate_limit, config.no_signup),
    )
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
